// BERT-compatible basic tokenization + greedy WordPiece, plus batch packing
// with dynamic padding. Hand-rolled rather than delegated to a pretrained
// tokenizer library: the vocabulary and the WordPiece algorithm are the
// unit under classification here, not an opaque dependency.

use unicode_normalization::UnicodeNormalization;

use crate::vocabulary::Vocabulary;

/// Maximum real tokens (excluding `[CLS]`/`[SEP]`) kept from a single input.
const MAX_INTERIOR_TOKENS: usize = 126;
/// Longest basic token considered for WordPiece decomposition; anything
/// longer becomes `[UNK]` without attempting to split it.
const MAX_TOKEN_CHARS: usize = 200;
/// Absolute cap on a packed sequence, including `[CLS]`/`[SEP]`.
pub const MAX_SEQ_LEN: usize = 128;

/// Flat, batch-packed tokenizer output ready for the inference session.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    pub batch_size: usize,
    pub seq_len: usize,
}

pub struct Tokenizer<'v> {
    vocab: &'v Vocabulary,
}

impl<'v> Tokenizer<'v> {
    pub fn new(vocab: &'v Vocabulary) -> Self {
        Self { vocab }
    }

    /// Tokenize a batch of texts and pad to the longest real sequence in
    /// the batch (capped at `MAX_SEQ_LEN`), not to the theoretical maximum.
    pub fn encode_batch(&self, texts: &[impl AsRef<str>]) -> Batch {
        let sequences: Vec<Vec<u32>> = texts.iter().map(|t| self.encode_ids(t.as_ref())).collect();
        let seq_len = sequences.iter().map(Vec::len).max().unwrap_or(0);
        let batch_size = sequences.len();

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        let token_type_ids = vec![0i64; batch_size * seq_len];

        for seq in &sequences {
            for &id in seq {
                input_ids.push(id as i64);
                attention_mask.push(1);
            }
            for _ in seq.len()..seq_len {
                input_ids.push(self.vocab.pad_id() as i64);
                attention_mask.push(0);
            }
        }

        Batch {
            input_ids,
            attention_mask,
            token_type_ids,
            batch_size,
            seq_len,
        }
    }

    /// `[CLS] <tokens> [SEP]` framed ID sequence for a single text, interior
    /// truncated to `MAX_INTERIOR_TOKENS` and the whole thing capped at
    /// `MAX_SEQ_LEN`.
    fn encode_ids(&self, text: &str) -> Vec<u32> {
        let basic_tokens = basic_tokenize(text);
        let mut ids = Vec::with_capacity(basic_tokens.len() + 2);
        ids.push(self.vocab.cls_id());

        for token in basic_tokens {
            for piece in self.wordpiece(&token) {
                ids.push(piece);
                if ids.len() - 1 >= MAX_INTERIOR_TOKENS {
                    break;
                }
            }
            if ids.len() - 1 >= MAX_INTERIOR_TOKENS {
                break;
            }
        }

        ids.truncate(MAX_INTERIOR_TOKENS + 1);
        ids.push(self.vocab.sep_id());
        ids.truncate(MAX_SEQ_LEN);
        // Truncating may have clipped the trailing [SEP]; restore it.
        if *ids.last().unwrap_or(&self.vocab.sep_id()) != self.vocab.sep_id() {
            let cap = MAX_SEQ_LEN.min(ids.len() + 1) - 1;
            ids.truncate(cap);
            ids.push(self.vocab.sep_id());
        }
        ids
    }

    /// Greedy longest-prefix WordPiece decomposition of a single basic
    /// token. Falls back to `[UNK]` if the token is too long or has no
    /// valid decomposition.
    fn wordpiece(&self, token: &str) -> Vec<u32> {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() > MAX_TOKEN_CHARS {
            return vec![self.vocab.unk_id()];
        }

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = chars.len();
            let mut found: Option<u32> = None;
            while end > start {
                let candidate: String = chars[start..end].iter().collect();
                let piece = if start == 0 {
                    candidate
                } else {
                    format!("##{candidate}")
                };
                if self.vocab.contains(&piece) {
                    found = Some(self.vocab.lookup(&piece));
                    break;
                }
                end -= 1;
            }
            match found {
                Some(id) => {
                    pieces.push(id);
                    start = end;
                }
                None => return vec![self.vocab.unk_id()],
            }
        }
        pieces
    }
}

/// Steps 1–5 of the spec: clean, isolate CJK, lowercase, strip accents,
/// whitespace+punctuation split. Produces the basic tokens handed to
/// WordPiece.
fn basic_tokenize(text: &str) -> Vec<String> {
    let cleaned = clean_text(text);
    let cjk_isolated = isolate_cjk(&cleaned);
    let lowered = cjk_isolated.to_lowercase();
    let accent_stripped = strip_accents(&lowered);

    let mut tokens = Vec::new();
    for word in accent_stripped.split_whitespace() {
        split_on_punctuation(word, &mut tokens);
    }
    tokens
}

fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\u{FFFD}' {
            continue;
        }
        if c == '\t' || c == '\n' || c == '\r' {
            out.push(' ');
            continue;
        }
        if is_control(c) {
            continue;
        }
        if is_whitespace_variant(c) {
            out.push(' ');
            continue;
        }
        out.push(c);
    }
    out
}

fn is_control(c: char) -> bool {
    if c == '\t' || c == '\n' || c == '\r' {
        return false;
    }
    c.is_control()
}

fn is_whitespace_variant(c: char) -> bool {
    c != ' ' && c.is_whitespace()
}

fn isolate_cjk(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if is_cjk(c) {
            out.push(' ');
            out.push(c);
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

fn is_cjk(c: char) -> bool {
    let cp = c as u32;
    matches!(cp,
        0x4E00..=0x9FFF
        | 0x3400..=0x4DBF
        | 0x20000..=0x2A6DF
        | 0x2A700..=0x2B73F
        | 0x2B740..=0x2B81F
        | 0x2B820..=0x2CEAF
        | 0xF900..=0xFAFF
        | 0x2F800..=0x2FA1F
    )
}

fn strip_accents(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn is_combining_mark(c: char) -> bool {
    unicode_categories::UnicodeCategories::is_mark_nonspacing(c)
        || unicode_categories::UnicodeCategories::is_mark_spacing_combining(c)
        || unicode_categories::UnicodeCategories::is_mark_enclosing(c)
}

fn split_on_punctuation(word: &str, out: &mut Vec<String>) {
    let mut current = String::new();
    for c in word.chars() {
        if is_punctuation(c) {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            out.push(c.to_string());
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
}

fn is_punctuation(c: char) -> bool {
    let cp = c as u32;
    let ascii_punct = (33..=47).contains(&cp)
        || (58..=64).contains(&cp)
        || (91..=96).contains(&cp)
        || (123..=126).contains(&cp);
    ascii_punct || unicode_categories::UnicodeCategories::is_punctuation(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vocab() -> Vocabulary {
        Vocabulary::from_tokens(
            vec![
                "[PAD]", "[UNK]", "[CLS]", "[SEP]", "hello", "world", "connect", "##ion", "##ing",
                "fail", "##ed", ",", ".",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
        .unwrap()
    }

    #[test]
    fn basic_tokenize_splits_whitespace_and_punctuation() {
        let tokens = basic_tokenize("Hello, world.");
        assert_eq!(tokens, vec!["hello", ",", "world", "."]);
    }

    #[test]
    fn basic_tokenize_strips_accents() {
        let tokens = basic_tokenize("café");
        assert_eq!(tokens, vec!["cafe"]);
    }

    #[test]
    fn basic_tokenize_isolates_cjk() {
        let tokens = basic_tokenize("中文test");
        assert_eq!(tokens, vec!["中", "文", "test"]);
    }

    #[test]
    fn basic_tokenize_drops_control_chars_and_replacement_char() {
        let tokens = basic_tokenize("a\u{0007}b\u{FFFD}c");
        assert_eq!(tokens, vec!["abc"]);
    }

    #[test]
    fn wordpiece_greedy_longest_match() {
        let vocab = test_vocab();
        let tokenizer = Tokenizer::new(&vocab);
        let pieces = tokenizer.wordpiece("connection");
        let ids: Vec<u32> = pieces;
        assert_eq!(
            ids,
            vec![vocab.lookup("connect"), vocab.lookup("##ion")]
        );
    }

    #[test]
    fn wordpiece_falls_back_to_unk_with_no_decomposition() {
        let vocab = test_vocab();
        let tokenizer = Tokenizer::new(&vocab);
        let pieces = tokenizer.wordpiece("xyzzyplugh");
        assert_eq!(pieces, vec![vocab.unk_id()]);
    }

    #[test]
    fn wordpiece_too_long_token_is_unk() {
        let vocab = test_vocab();
        let tokenizer = Tokenizer::new(&vocab);
        let long = "a".repeat(250);
        assert_eq!(tokenizer.wordpiece(&long), vec![vocab.unk_id()]);
    }

    #[test]
    fn encode_ids_frames_with_cls_and_sep() {
        let vocab = test_vocab();
        let tokenizer = Tokenizer::new(&vocab);
        let ids = tokenizer.encode_ids("hello world");
        assert_eq!(ids.first(), Some(&vocab.cls_id()));
        assert_eq!(ids.last(), Some(&vocab.sep_id()));
        assert_eq!(ids.len(), 4); // [CLS] hello world [SEP]
    }

    #[test]
    fn encode_ids_truncates_interior_to_126_tokens() {
        let vocab = test_vocab();
        let tokenizer = Tokenizer::new(&vocab);
        let long_text = "hello ".repeat(200);
        let ids = tokenizer.encode_ids(&long_text);
        assert!(ids.len() <= MAX_SEQ_LEN);
        assert_eq!(ids.last(), Some(&vocab.sep_id()));
    }

    #[test]
    fn encode_batch_pads_to_longest_real_sequence() {
        let vocab = test_vocab();
        let tokenizer = Tokenizer::new(&vocab);
        let batch = tokenizer.encode_batch(&["hello", "hello world"]);
        assert_eq!(batch.batch_size, 2);
        // "hello world" -> [CLS] hello world [SEP] = 4 tokens
        assert_eq!(batch.seq_len, 4);
        assert_eq!(
            batch.input_ids.len(),
            batch.batch_size * batch.seq_len
        );
        assert_eq!(batch.attention_mask.len(), batch.input_ids.len());
        assert_eq!(batch.token_type_ids.len(), batch.input_ids.len());
        // second row (index 1) has no padding
        let row1_mask = &batch.attention_mask[batch.seq_len..];
        assert!(row1_mask.iter().all(|&m| m == 1));
        // first row ("hello" -> 3 tokens) has one padded slot
        let row0_mask = &batch.attention_mask[..batch.seq_len];
        assert_eq!(row0_mask, &[1, 1, 1, 0]);
    }

    #[test]
    fn encode_batch_token_type_ids_all_zero() {
        let vocab = test_vocab();
        let tokenizer = Tokenizer::new(&vocab);
        let batch = tokenizer.encode_batch(&["hello world", "hello"]);
        assert!(batch.token_type_ids.iter().all(|&t| t == 0));
    }

    #[test]
    fn encode_batch_seq_len_never_exceeds_max() {
        let vocab = test_vocab();
        let tokenizer = Tokenizer::new(&vocab);
        let long_text = "hello ".repeat(300);
        let batch = tokenizer.encode_batch(&[long_text.as_str()]);
        assert!(batch.seq_len <= MAX_SEQ_LEN);
    }
}
