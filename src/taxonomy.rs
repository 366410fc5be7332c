// Two-level classification taxonomy: 8 roots, 3-9 leaves each. The tree is
// a fixed data literal rather than an external file — it is specified once
// and never mutated at runtime.

use crate::inference::Embedder;

#[derive(Debug, Clone, Copy)]
pub struct LeafDef {
    pub name: &'static str,
    pub description: &'static str,
    pub severity: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct RootDef {
    pub name: &'static str,
    pub leaves: &'static [LeafDef],
}

/// An embedded taxonomy leaf, produced once at startup.
#[derive(Debug, Clone)]
pub struct EmbeddedLabel {
    pub path: String,
    pub vector: Vec<f32>,
    pub severity: String,
}

pub struct Taxonomy {
    roots: &'static [RootDef],
    labels: Vec<EmbeddedLabel>,
}

impl Taxonomy {
    /// Embeds every leaf's `"{RootName}: {LeafDescription}"` prompt in a
    /// single batch call and stores the resulting labels in tree order.
    pub async fn build(embedder: &Embedder) -> Result<Self, crate::error::InferenceError> {
        let roots = Self::definition();
        let mut prompts = Vec::new();
        let mut meta = Vec::new();
        for root in roots {
            for leaf in root.leaves {
                prompts.push(format!("{}: {}", root.name, leaf.description));
                meta.push((format!("{}.{}", root.name, leaf.name), leaf.severity));
            }
        }

        let vectors = embedder.embed_batch(&prompts).await?;
        let labels = vectors
            .into_iter()
            .zip(meta)
            .map(|(vector, (path, severity))| EmbeddedLabel {
                path,
                vector,
                severity: severity.to_string(),
            })
            .collect();

        Ok(Self { roots, labels })
    }

    pub fn labels(&self) -> &[EmbeddedLabel] {
        &self.labels
    }

    pub fn roots(&self) -> &'static [RootDef] {
        self.roots
    }

    pub fn definition() -> &'static [RootDef] {
        &TAXONOMY
    }
}

macro_rules! leaf {
    ($name:expr, $description:expr, $severity:expr) => {
        LeafDef {
            name: $name,
            description: $description,
            severity: $severity,
        }
    };
}

static TAXONOMY: [RootDef; 8] = [
    RootDef {
        name: "ERROR",
        leaves: &[
            leaf!("connection_failure", "network connection to a downstream dependency failed or timed out", "error"),
            leaf!("authentication_failure", "a request was rejected due to invalid or expired credentials", "error"),
            leaf!("database_error", "a database query, transaction, or connection failed", "error"),
            leaf!("null_pointer", "the application dereferenced a null or undefined reference", "error"),
            leaf!("out_of_memory", "the process exhausted available memory or hit an allocation limit", "error"),
            leaf!("unhandled_exception", "an exception propagated out of application code without being caught", "error"),
            leaf!("validation_error", "input failed schema or business-rule validation", "error"),
        ],
    },
    RootDef {
        name: "REQUEST",
        leaves: &[
            leaf!("success", "an HTTP or RPC request completed successfully", "info"),
            leaf!("client_error", "a request failed due to a client-side problem, HTTP 4xx", "warning"),
            leaf!("server_error", "a request failed due to a server-side problem, HTTP 5xx", "error"),
            leaf!("redirect", "a request was redirected to another resource", "info"),
            leaf!("slow_response", "a request completed but exceeded the expected latency budget", "warning"),
        ],
    },
    RootDef {
        name: "DEPLOYMENT",
        leaves: &[
            leaf!("build_started", "a build or deployment pipeline began running", "info"),
            leaf!("build_succeeded", "a build or deployment pipeline completed successfully", "info"),
            leaf!("build_failed", "a build or deployment pipeline failed", "error"),
            leaf!("rollback", "a deployment was rolled back to a previous version", "warning"),
        ],
    },
    RootDef {
        name: "RESOURCE",
        leaves: &[
            leaf!("cpu_throttled", "the process was throttled due to CPU limits", "warning"),
            leaf!("memory_pressure", "the host or container is under memory pressure", "warning"),
            leaf!("disk_full", "available disk space is critically low or exhausted", "error"),
            leaf!("rate_limited", "a downstream dependency returned a rate-limit response", "warning"),
            leaf!("connection_pool_exhausted", "a connection pool ran out of available connections", "error"),
        ],
    },
    RootDef {
        name: "SECURITY",
        leaves: &[
            leaf!("unauthorized_access", "an actor attempted to access a resource without permission", "error"),
            leaf!("suspicious_activity", "behavior consistent with abuse or compromise was observed", "warning"),
            leaf!("certificate_expired", "a TLS certificate has expired or is about to expire", "error"),
            leaf!("injection_attempt", "input consistent with an injection attack was observed", "error"),
        ],
    },
    RootDef {
        name: "LIFECYCLE",
        leaves: &[
            leaf!("process_started", "the application process started", "info"),
            leaf!("process_stopped", "the application process stopped or exited", "info"),
            leaf!("health_check_passed", "a health check reported the service healthy", "debug"),
            leaf!("health_check_failed", "a health check reported the service unhealthy", "warning"),
            leaf!("crash_restart", "the process crashed and was restarted by its supervisor", "error"),
        ],
    },
    RootDef {
        name: "CONFIGURATION",
        leaves: &[
            leaf!("config_loaded", "configuration was loaded successfully at startup", "debug"),
            leaf!("config_reload", "configuration was reloaded at runtime", "info"),
            leaf!("config_invalid", "configuration failed validation", "error"),
            leaf!("feature_flag_changed", "a feature flag's value changed", "info"),
        ],
    },
    RootDef {
        name: "AUDIT",
        leaves: &[
            leaf!("user_login", "a user successfully authenticated", "info"),
            leaf!("user_logout", "a user session ended", "info"),
            leaf!("permission_changed", "a user or role's permissions were modified", "info"),
            leaf!("data_export", "a bulk data export was performed", "info"),
            leaf!("admin_action", "an administrative action was performed", "info"),
            leaf!("record_deleted", "a record was permanently deleted", "warning"),
            leaf!("record_modified", "an existing record was modified", "debug"),
            leaf!("secret_rotated", "a credential or secret was rotated", "info"),
        ],
    },
];
