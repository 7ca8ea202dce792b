use crate::pfsense::serialize::{quote, SerializedValue};
use crate::utils::error::AgentError;
use sha1::{Digest, Sha1};
use std::fmt::{self, Display};
use std::path::Path;

/// Includes and state every pfSsh session needs before `$config` can be touched.
const BOOTSTRAP: &[&str] = &[
    "require_once(\"config.inc\");",
    "require_once(\"functions.inc\");",
    "require_once(\"filter.inc\");",
    "require_once(\"shaper.inc\");",
    "get_interface_arr(true);",
    "global $config;",
    "$config = parse_config(true);",
];

const FILTER_BOOTSTRAP: &[&str] = &[
    "require_once(\"config.inc\");",
    "require_once(\"functions.inc\");",
    "require_once(\"filter.inc\");",
    "require_once(\"shaper.inc\");",
    "require_once(\"ipsec.inc\");",
    "require_once(\"vpn.inc\");",
    "get_interface_arr(true);",
];

/// pfSsh buffers statements until `exec`, and leaves on `exit`.
const TERMINATE: &[&str] = &["exec", "exit"];

pub const WRITE_CONFIG: &str = "write_config();";
pub const FILTER_CONFIGURE: &str = "filter_configure();";

/// Built in the PHP source from two halves so an echoing console never prints the marker
/// unless the statement actually ran.
const READ_BEGIN: (&str, &str) = ("__PFCONF", "_BEGIN__");
const READ_END: (&str, &str) = ("__PFCONF", "_END__");

/// Location in the appliance's `$config` tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigPath {
    section: &'static str,
    key: &'static str,
}

impl ConfigPath {
    pub const fn new(section: &'static str, key: &'static str) -> ConfigPath {
        ConfigPath { section, key }
    }

    pub fn dotted(&self) -> String {
        format!("{}.{}", self.section, self.key)
    }
}

impl Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$config['{}']['{}']", self.section, self.key)
    }
}

/// Ordered statements for one console session. Immutable once composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScript {
    statements: Vec<String>,
}

impl SessionScript {
    fn from_parts(parts: &[&[&str]], body: Vec<String>, tail: &[&str]) -> SessionScript {
        let mut statements: Vec<String> = parts
            .iter()
            .flat_map(|part| part.iter().map(|s| s.to_string()))
            .collect();
        statements.extend(body);
        statements.extend(tail.iter().map(|s| s.to_string()));
        SessionScript { statements }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// The text fed to the console's stdin.
    pub fn render(&self) -> String {
        let mut out = self.statements.join("\n");
        out.push('\n');
        out
    }

    pub fn digest(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.render().as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

pub struct Composer {
    invalidate_cache: String,
}

impl Composer {
    pub fn new(cache_file: &Path) -> Result<Composer, AgentError> {
        let literal = quote(&cache_file.display().to_string())?;
        Ok(Composer {
            invalidate_cache: format!("unlink_if_exists({});", literal),
        })
    }

    /// bootstrap, invalidate, assign, persist, invalidate, reload, exit. Always the full
    /// sequence, whatever the current value is.
    pub fn compose(&self, path: &ConfigPath, value: &SerializedValue) -> SessionScript {
        SessionScript::from_parts(
            &[BOOTSTRAP],
            vec![
                self.invalidate_cache.clone(),
                format!("{} = {};", path, value.as_str()),
                WRITE_CONFIG.to_owned(),
                self.invalidate_cache.clone(),
                FILTER_CONFIGURE.to_owned(),
            ],
            TERMINATE,
        )
    }

    /// Read-only session printing the JSON encoding of the value at `path` between markers.
    pub fn compose_read(&self, path: &ConfigPath) -> SessionScript {
        SessionScript::from_parts(
            &[BOOTSTRAP],
            vec![format!(
                "echo '{}' . '{}' . json_encode({}) . '{}' . '{}' . PHP_EOL;",
                READ_BEGIN.0, READ_BEGIN.1, path, READ_END.0, READ_END.1
            )],
            TERMINATE,
        )
    }
}

/// Pulls the JSON text printed by a [`Composer::compose_read`] session out of its stdout.
pub fn extract_read(stdout: &str) -> Option<&str> {
    let begin = format!("{}{}", READ_BEGIN.0, READ_BEGIN.1);
    let end = format!("{}{}", READ_END.0, READ_END.1);
    let start = stdout.rfind(&begin)? + begin.len();
    let len = stdout[start..].find(&end)?;
    Some(&stdout[start..start + len])
}

/// Reconfigures and resyncs the filter. Touches no rule.
pub fn compose_filter_reload() -> SessionScript {
    SessionScript::from_parts(
        &[FILTER_BOOTSTRAP],
        vec![
            "$retval = 0;".to_owned(),
            format!("$retval = {}", FILTER_CONFIGURE),
            "clear_subsystem_dirty('filter');".to_owned(),
            "pfSense_handle_custom_code(\"/usr/local/pkg/firewall_rules/apply\");".to_owned(),
            "filter_configure_sync();".to_owned(),
        ],
        TERMINATE,
    )
}
