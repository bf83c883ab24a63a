use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use dispatcher::RunConfiguration;

/// Compile and run command lines for one run configuration. Commands are
/// split on whitespace; `{sources}`, `{args}` and `{testClasses}` are
/// substituted per argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProfile {
    pub compile: Option<String>,
    pub run: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSet {
    pub java: CommandProfile,
    pub junit: CommandProfile,
    pub js: CommandProfile,
    pub canvas: CommandProfile,
}

impl ProfileSet {
    pub fn get(&self, conf: RunConfiguration) -> &CommandProfile {
        match conf {
            RunConfiguration::Java => &self.java,
            RunConfiguration::Junit => &self.junit,
            RunConfiguration::Js => &self.js,
            RunConfiguration::Canvas => &self.canvas,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandProfile> {
        [&self.java, &self.junit, &self.js, &self.canvas].into_iter()
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        let jvm = |run: &str| CommandProfile {
            compile: Some("/usr/bin/kotlinc {sources} -d classes".to_string()),
            run: run.to_string(),
        };
        let js = CommandProfile {
            compile: Some("/usr/bin/kotlinc-js {sources} -output program.js".to_string()),
            run: "/usr/bin/node program.js {args}".to_string(),
        };
        Self {
            java: jvm("/usr/bin/kotlin -classpath classes MainKt {args}"),
            junit: jvm("/usr/bin/kotlin -classpath classes org.junit.runner.JUnitCore {testClasses}"),
            canvas: js.clone(),
            js,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub templates_root: PathBuf,
    pub analysis_url: String,
    pub analysis_timeout: Duration,
    pub sandbox_root: PathBuf,
    pub max_body_bytes: usize,
    pub run_timeout: Duration,
    pub max_output_bytes: usize,
    pub profiles: ProfileSet,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let defaults = ProfileSet::default();
        let profile = |name: &str, default: &CommandProfile| CommandProfile {
            compile: match lookup(&format!("PLAYGROUND_{name}_COMPILE")) {
                Some(value) if value.trim().is_empty() => None,
                Some(value) => Some(value),
                None => default.compile.clone(),
            },
            run: lookup(&format!("PLAYGROUND_{name}_RUN")).unwrap_or_else(|| default.run.clone()),
        };
        let profiles = ProfileSet {
            java: profile("JAVA", &defaults.java),
            junit: profile("JUNIT", &defaults.junit),
            js: profile("JS", &defaults.js),
            canvas: profile("CANVAS", &defaults.canvas),
        };

        let sandbox_root = lookup("PLAYGROUND_SANDBOX_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("playground-sandbox"));

        Ok(Self {
            bind_addr: parse_or(&lookup, "PLAYGROUND_BIND_ADDR", "0.0.0.0:6813".parse()?)?,
            database_url,
            database_max_connections: parse_or(&lookup, "PLAYGROUND_DATABASE_MAX_CONNECTIONS", 10)?,
            templates_root: lookup("PLAYGROUND_TEMPLATES_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./templates")),
            analysis_url: lookup("PLAYGROUND_ANALYSIS_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8091".to_string()),
            analysis_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PLAYGROUND_ANALYSIS_TIMEOUT_SECS",
                30,
            )?),
            sandbox_root: absolutize(sandbox_root)?,
            max_body_bytes: parse_or(&lookup, "PLAYGROUND_MAX_BODY_BYTES", 1024 * 1024)?,
            run_timeout: Duration::from_secs(parse_or(&lookup, "PLAYGROUND_RUN_TIMEOUT_SECS", 10)?),
            max_output_bytes: parse_or(&lookup, "PLAYGROUND_MAX_OUTPUT_BYTES", 64 * 1024)?,
            profiles,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}

fn absolutize(path: PathBuf) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
