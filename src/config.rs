// Configuration for the driver and the descriptor builder.
// Reads from environment variables with sensible defaults.

use std::env;
use std::sync::OnceLock;
use tracing::warn;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

const DEFAULT_RULES_GO_REPOSITORY: &str = "@io_bazel_rules_go";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Build tool binary (GOPACKAGESDRIVER_BAZEL)
    pub bazel_bin: String,

    /// Flags passed to every build tool command (GOPACKAGESDRIVER_BAZEL_FLAGS)
    pub bazel_flags: Vec<String>,

    /// Extra flags for `query` (GOPACKAGESDRIVER_BAZEL_QUERY_FLAGS)
    pub query_flags: Vec<String>,

    /// Extra flags for `build` (GOPACKAGESDRIVER_BAZEL_BUILD_FLAGS)
    pub build_flags: Vec<String>,

    /// Repository hosting the aspect and stdlib targets
    /// (GOPACKAGESDRIVER_RULES_GO_REPOSITORY_NAME)
    pub rules_go_repo: String,

    /// go binary used when no workspace is found (GOPACKAGESDRIVER_GO)
    pub go_bin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bazel_bin: "bazel".to_string(),
            bazel_flags: Vec::new(),
            query_flags: Vec::new(),
            build_flags: Vec::new(),
            rules_go_repo: DEFAULT_RULES_GO_REPOSITORY.to_string(),
            go_bin: "go".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();

        if let Some(val) = lookup("GOPACKAGESDRIVER_BAZEL") {
            if val.trim().is_empty() {
                warn!(
                    default = %config.bazel_bin,
                    "empty GOPACKAGESDRIVER_BAZEL, using default"
                );
            } else {
                config.bazel_bin = val;
            }
        }

        if let Some(val) = lookup("GOPACKAGESDRIVER_BAZEL_FLAGS") {
            config.bazel_flags = split_flags(&val);
        }
        if let Some(val) = lookup("GOPACKAGESDRIVER_BAZEL_QUERY_FLAGS") {
            config.query_flags = split_flags(&val);
        }
        if let Some(val) = lookup("GOPACKAGESDRIVER_BAZEL_BUILD_FLAGS") {
            config.build_flags = split_flags(&val);
        }

        if let Some(val) = lookup("GOPACKAGESDRIVER_RULES_GO_REPOSITORY_NAME") {
            let val = val.trim();
            if val.is_empty() {
                warn!(
                    default = %config.rules_go_repo,
                    "empty GOPACKAGESDRIVER_RULES_GO_REPOSITORY_NAME, using default"
                );
            } else if val.starts_with('@') {
                config.rules_go_repo = val.to_string();
            } else {
                warn!(value = val, "repository name without leading '@', adding it");
                config.rules_go_repo = format!("@{val}");
            }
        }

        if let Some(val) = lookup("GOPACKAGESDRIVER_GO")
            && !val.trim().is_empty()
        {
            config.go_bin = val;
        }

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }

    pub fn aspect_file(&self) -> String {
        format!("{}//go/tools/gopackagesdriver:aspect.bzl", self.rules_go_repo)
    }

    /// Pseudo-target that builds descriptors for the whole standard library.
    pub fn stdlib_target(&self) -> String {
        format!("{}//go/tools/gopackagesdriver:stdlib", self.rules_go_repo)
    }

    /// Prefix of every standard library package ID.
    pub fn stdlib_id_prefix(&self) -> String {
        format!("{}//:stdlib%", self.rules_go_repo)
    }

    pub fn stdlib_id(&self, import_path: &str) -> String {
        format!("{}{}", self.stdlib_id_prefix(), import_path)
    }
}

fn split_flags(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(|flag| flag.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bazel_bin, "bazel");
        assert!(config.bazel_flags.is_empty());
        assert_eq!(config.rules_go_repo, "@io_bazel_rules_go");
        assert_eq!(config.go_bin, "go");
        assert_eq!(
            config.stdlib_id("fmt"),
            "@io_bazel_rules_go//:stdlib%fmt"
        );
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GOPACKAGESDRIVER_BAZEL", "/usr/bin/bazelisk"),
            ("GOPACKAGESDRIVER_BAZEL_FLAGS", " --config=ci  --noshow_progress "),
            ("GOPACKAGESDRIVER_BAZEL_BUILD_FLAGS", "--keep_going"),
            ("GOPACKAGESDRIVER_RULES_GO_REPOSITORY_NAME", "rules_go"),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.bazel_bin, "/usr/bin/bazelisk");
        assert_eq!(config.bazel_flags, vec!["--config=ci", "--noshow_progress"]);
        assert_eq!(config.build_flags, vec!["--keep_going"]);
        assert!(config.query_flags.is_empty());
        assert_eq!(config.rules_go_repo, "@rules_go");
        assert_eq!(
            config.aspect_file(),
            "@rules_go//go/tools/gopackagesdriver:aspect.bzl"
        );
    }
}
