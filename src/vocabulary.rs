// Line-indexed WordPiece vocabulary: token text on each line, the line
// index (0-based) is the token's ID.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";

const REQUIRED_TOKENS: [&str; 4] = [PAD_TOKEN, UNK_TOKEN, CLS_TOKEN, SEP_TOKEN];

#[derive(Debug)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: Vec<String>,
    pad_id: u32,
    unk_id: u32,
    cls_id: u32,
    sep_id: u32,
}

impl Vocabulary {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        if contents.trim().is_empty() {
            return Err(ConfigError::EmptyVocabulary {
                path: path.to_path_buf(),
            });
        }

        let id_to_token: Vec<String> = contents.lines().map(str::to_string).collect();
        let mut token_to_id = HashMap::with_capacity(id_to_token.len());
        for (id, token) in id_to_token.iter().enumerate() {
            token_to_id.insert(token.clone(), id as u32);
        }

        let resolve = |token: &'static str| -> Result<u32, ConfigError> {
            token_to_id
                .get(token)
                .copied()
                .ok_or(ConfigError::MissingSpecialToken {
                    path: path.to_path_buf(),
                    token,
                })
        };

        let missing: Vec<ConfigError> = REQUIRED_TOKENS
            .iter()
            .filter_map(|t| resolve(t).err())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Multiple(missing));
        }

        Ok(Self {
            pad_id: resolve(PAD_TOKEN)?,
            unk_id: resolve(UNK_TOKEN)?,
            cls_id: resolve(CLS_TOKEN)?,
            sep_id: resolve(SEP_TOKEN)?,
            token_to_id,
            id_to_token,
        })
    }

    /// Build a vocabulary directly from an in-memory token list, skipping
    /// the file I/O. Used by tests and by any embedded/default vocabulary.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, ConfigError> {
        let dummy_path = PathBuf::from("<in-memory>");
        if tokens.is_empty() {
            return Err(ConfigError::EmptyVocabulary { path: dummy_path });
        }
        let mut token_to_id = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            token_to_id.insert(token.clone(), id as u32);
        }
        let resolve = |token: &'static str| -> Result<u32, ConfigError> {
            token_to_id
                .get(token)
                .copied()
                .ok_or(ConfigError::MissingSpecialToken {
                    path: dummy_path.clone(),
                    token,
                })
        };

        let missing: Vec<ConfigError> = REQUIRED_TOKENS
            .iter()
            .filter_map(|t| resolve(t).err())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Multiple(missing));
        }

        Ok(Self {
            pad_id: resolve(PAD_TOKEN)?,
            unk_id: resolve(UNK_TOKEN)?,
            cls_id: resolve(CLS_TOKEN)?,
            sep_id: resolve(SEP_TOKEN)?,
            token_to_id,
            id_to_token: tokens,
        })
    }

    pub fn lookup(&self, token: &str) -> u32 {
        self.token_to_id.get(token).copied().unwrap_or(self.unk_id)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }

    pub fn cls_id(&self) -> u32 {
        self.cls_id
    }

    pub fn sep_id(&self) -> u32 {
        self.sep_id
    }
}
