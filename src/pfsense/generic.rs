//! Option router: hostname, domain, dns, ntptimeserver, timezone.

use crate::pfsense::console::Console;
use crate::pfsense::report::{report, ExecutionOutcome};
use crate::pfsense::script::{extract_read, Composer, ConfigPath};
use crate::pfsense::serialize::{serialize, ListEncoding, OptionValue, Shape};
use crate::utils::config::AgentConfig;
use crate::utils::error::AgentError;
use log::{info, warn};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Hostname,
    Domain,
    Dns,
    Ntptimeserver,
    Timezone,
}

pub const OPTION_KINDS: [OptionKind; 5] = [
    OptionKind::Dns,
    OptionKind::Hostname,
    OptionKind::Domain,
    OptionKind::Ntptimeserver,
    OptionKind::Timezone,
];

impl OptionKind {
    pub fn from_name(name: &str) -> Option<OptionKind> {
        OPTION_KINDS.iter().copied().find(|kind| kind.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            OptionKind::Hostname => "hostname",
            OptionKind::Domain => "domain",
            OptionKind::Dns => "dns",
            OptionKind::Ntptimeserver => "ntptimeserver",
            OptionKind::Timezone => "timezone",
        }
    }

    pub fn shape(self) -> Shape {
        match self {
            OptionKind::Hostname | OptionKind::Domain | OptionKind::Timezone => Shape::Scalar,
            OptionKind::Dns => Shape::List(ListEncoding::Array),
            OptionKind::Ntptimeserver => Shape::List(ListEncoding::SpaceJoined),
        }
    }

    pub fn path(self) -> ConfigPath {
        match self {
            OptionKind::Hostname => ConfigPath::new("system", "hostname"),
            OptionKind::Domain => ConfigPath::new("system", "domain"),
            OptionKind::Dns => ConfigPath::new("system", "dnsserver"),
            OptionKind::Ntptimeserver => ConfigPath::new("system", "timeservers"),
            OptionKind::Timezone => ConfigPath::new("system", "timezone"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionIntent {
    pub kind: OptionKind,
    pub value: OptionValue,
}

impl OptionIntent {
    /// Builds an intent from `{"option": .., "value": ..}`.
    pub fn from_params(params: &Value) -> Result<OptionIntent, AgentError> {
        let fields = params.as_object().ok_or_else(|| {
            AgentError::Validation(String::from("parameters must be a mapping"))
        })?;
        let unknown: Vec<&str> = fields
            .keys()
            .map(String::as_str)
            .filter(|key| !["option", "value"].contains(key))
            .collect();
        if !unknown.is_empty() {
            return Err(AgentError::Validation(format!(
                "unsupported parameters: {}",
                unknown.join(", ")
            )));
        }

        let kind = match fields.get("option") {
            None | Some(Value::Null) => {
                return Err(AgentError::Validation(String::from(
                    "missing required arguments: option",
                )))
            }
            Some(Value::String(name)) => OptionKind::from_name(name),
            Some(_) => None,
        }
        .ok_or_else(|| {
            let names: Vec<&str> = OPTION_KINDS.iter().map(|k| k.name()).collect();
            AgentError::Validation(format!(
                "value of option must be one of: {}, got: {}",
                names.join(", "),
                fields["option"]
            ))
        })?;

        let value = match fields.get("value") {
            None | Some(Value::Null) => {
                return Err(AgentError::Validation(String::from(
                    "missing required arguments: value",
                )))
            }
            Some(value) => value,
        };
        let value = OptionValue::from_json(value).map_err(|observed| AgentError::TypeMismatch {
            option: kind.name(),
            expected: kind.shape().describe(),
            observed,
        })?;
        Ok(OptionIntent { kind, value })
    }

    /// The value as the appliance stores it, JSON encoded.
    fn stored_form(&self) -> Value {
        match (&self.value, self.kind.shape()) {
            (OptionValue::List(items), Shape::List(ListEncoding::SpaceJoined)) => {
                Value::String(items.join(" "))
            }
            (OptionValue::List(items), _) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            (OptionValue::Scalar(s), _) => Value::String(s.to_owned()),
        }
    }
}

pub struct OptionRouter<'a, C: Console> {
    console: &'a C,
    composer: Composer,
    detect_changes: bool,
    check_mode: bool,
}

impl<'a, C: Console> OptionRouter<'a, C> {
    pub fn new(
        console: &'a C,
        config: &AgentConfig,
        check_mode: bool,
    ) -> Result<OptionRouter<'a, C>, AgentError> {
        Ok(OptionRouter {
            console,
            composer: Composer::new(&config.cache_file)?,
            detect_changes: config.detect_changes,
            check_mode,
        })
    }

    /// serialize, compose, execute, report. Validation happens before the console is touched.
    pub fn route(&self, intent: &OptionIntent) -> Result<ExecutionOutcome, AgentError> {
        let value = serialize(intent.kind, &intent.value)?;
        let path = intent.kind.path();
        info!("Setting {} to {}", path.dotted(), value.as_str());

        if self.detect_changes {
            if let Some(mut outcome) = self.already_set(intent, &path)? {
                outcome.check_mode = self.check_mode;
                return Ok(outcome);
            }
        }

        let script = self.composer.compose(&path, &value);
        if self.check_mode {
            info!("Check mode, not launching {}", self.console.command());
            return Ok(ExecutionOutcome::planned(&self.console.command(), &script));
        }
        let raw = self.console.execute(&script)?;
        Ok(report(raw, &self.console.command()))
    }

    /// Reads the current value. Some(outcome) when it already matches and no write is needed.
    fn already_set(
        &self,
        intent: &OptionIntent,
        path: &ConfigPath,
    ) -> Result<Option<ExecutionOutcome>, AgentError> {
        let raw = self.console.execute(&self.composer.compose_read(path))?;
        if raw.exit_code != 0 {
            warn!(
                "Reading {} exited {}, writing unconditionally",
                path.dotted(),
                raw.exit_code
            );
            return Ok(None);
        }
        let current = raw
            .stdout
            .as_deref()
            .and_then(extract_read)
            .and_then(|text| serde_json::from_str::<Value>(text).ok());
        match current {
            Some(current) if current == intent.stored_form() => {
                info!("{} already holds the requested value", path.dotted());
                Ok(Some(report(raw, &self.console.command()).changed(false)))
            }
            Some(_) => Ok(None),
            None => {
                warn!("Could not read {}, writing unconditionally", path.dotted());
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pfsense::console::tests::RecordingConsole;
    use serde_json::json;

    fn route_params(
        console: &RecordingConsole,
        config: &AgentConfig,
        params: Value,
    ) -> Result<ExecutionOutcome, AgentError> {
        let intent = OptionIntent::from_params(&params)?;
        OptionRouter::new(console, config, false)?.route(&intent)
    }

    #[test]
    fn kinds_map_to_paths_and_shapes() {
        let table = [
            ("hostname", Shape::Scalar, "system.hostname"),
            ("domain", Shape::Scalar, "system.domain"),
            ("dns", Shape::List(ListEncoding::Array), "system.dnsserver"),
            ("ntptimeserver", Shape::List(ListEncoding::SpaceJoined), "system.timeservers"),
            ("timezone", Shape::Scalar, "system.timezone"),
        ];
        for (name, shape, path) in table {
            let kind = OptionKind::from_name(name).unwrap();
            assert_eq!(kind.shape(), shape);
            assert_eq!(kind.path().dotted(), path);
        }
        assert_eq!(OptionKind::from_name("gateway"), None);
    }

    #[test]
    fn scalar_options_refuse_non_strings() {
        for option in ["hostname", "domain", "timezone"] {
            for value in [json!(42), json!(["a", "b"]), json!(true), json!({"a": "b"})] {
                let console = RecordingConsole::echoing();
                let err = route_params(
                    &console,
                    &AgentConfig::default(),
                    json!({"option": option, "value": value}),
                )
                .unwrap_err();
                assert!(err.is_validation(), "{} {}", option, value);
                assert_eq!(console.invocations(), 0);
            }
        }
    }

    #[test]
    fn list_options_refuse_non_lists() {
        for option in ["dns", "ntptimeserver"] {
            for value in [json!("not-a-list"), json!(8), json!(["ok", 1])] {
                let console = RecordingConsole::echoing();
                let err = route_params(
                    &console,
                    &AgentConfig::default(),
                    json!({"option": option, "value": value}),
                )
                .unwrap_err();
                assert!(err.is_validation(), "{} {}", option, value);
                assert_eq!(console.invocations(), 0);
            }
        }
    }

    #[test]
    fn mismatch_message_names_option_and_type() {
        let console = RecordingConsole::echoing();
        let err = route_params(
            &console,
            &AgentConfig::default(),
            json!({"option": "dns", "value": "not-a-list"}),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Value for dns is not a list of strings (got string)"
        );
    }

    #[test]
    fn unknown_option_and_missing_fields() {
        let console = RecordingConsole::echoing();
        let config = AgentConfig::default();
        for params in [
            json!({"option": "gateway", "value": "x"}),
            json!({"option": 3, "value": "x"}),
            json!({"value": "x"}),
            json!({"option": "hostname"}),
            json!({"option": "hostname", "value": null}),
            json!({"option": "hostname", "value": "fw", "state": "present"}),
        ] {
            let err = route_params(&console, &config, params.clone()).unwrap_err();
            assert!(matches!(err, AgentError::Validation(_)), "{}", params);
        }
        assert_eq!(console.invocations(), 0);
    }

    #[test]
    fn hostname_end_to_end() {
        let console = RecordingConsole::echoing();
        let outcome = route_params(
            &console,
            &AgentConfig::default(),
            json!({"option": "hostname", "value": "firewall1"}),
        )
        .unwrap();
        assert_eq!(outcome.rc, 0);
        assert!(outcome.changed);
        assert_eq!(outcome.stderr, "");
        assert_eq!(outcome.cmd, "/usr/local/sbin/pfSsh.php");
        assert!(outcome
            .stdout
            .contains("$config['system']['hostname'] = 'firewall1';"));
        assert_eq!(console.invocations(), 1);
    }

    #[test]
    fn hostname_through_echoing_subprocess() {
        let config = AgentConfig {
            console: std::path::PathBuf::from("/bin/cat"),
            ..AgentConfig::default()
        };
        let console = crate::pfsense::console::PfSsh::from_config(&config);
        let intent = OptionIntent::from_params(&json!({"option": "hostname", "value": "firewall1"}))
            .unwrap();
        let outcome = OptionRouter::new(&console, &config, false)
            .unwrap()
            .route(&intent)
            .unwrap();
        assert_eq!(outcome.rc, 0);
        assert!(outcome.changed);
        assert_eq!(outcome.stderr, "");
        assert_eq!(outcome.cmd, "/bin/cat");
        assert!(outcome.stdout.ends_with("exec\nexit"));
    }

    #[test]
    fn dns_and_ntp_reach_the_console_encoded() {
        let console = RecordingConsole::echoing();
        let config = AgentConfig::default();
        route_params(
            &console,
            &config,
            json!({"option": "dns", "value": ["192.168.1.1", "8.8.4.4"]}),
        )
        .unwrap();
        route_params(
            &console,
            &config,
            json!({"option": "ntptimeserver", "value": ["192.168.1.1", "8.8.4.4"]}),
        )
        .unwrap();
        let scripts = console.scripts.borrow();
        assert!(scripts[0].statements().contains(
            &"$config['system']['dnsserver'] = array('192.168.1.1','8.8.4.4');".to_string()
        ));
        assert!(scripts[1].statements().contains(
            &"$config['system']['timeservers'] = '192.168.1.1 8.8.4.4';".to_string()
        ));
    }

    #[test]
    fn console_failure_is_reported_not_raised() {
        let console = RecordingConsole::replying(vec![(255, "PHP Fatal error\r\n")]);
        let outcome = route_params(
            &console,
            &AgentConfig::default(),
            json!({"option": "timezone", "value": "Etc/UTC"}),
        )
        .unwrap();
        assert_eq!(outcome.rc, 255);
        assert_eq!(outcome.stdout, "PHP Fatal error");
        assert!(outcome.changed);
    }

    #[test]
    fn known_non_idempotent_without_change_detection() {
        let console = RecordingConsole::echoing();
        let config = AgentConfig::default();
        let params = json!({"option": "hostname", "value": "firewall1"});
        let first = route_params(&console, &config, params.clone()).unwrap();
        let second = route_params(&console, &config, params).unwrap();
        assert!(first.changed);
        assert!(second.changed);
        assert_eq!(console.invocations(), 2);
    }

    #[test]
    fn change_detection_skips_matching_write() {
        let console = RecordingConsole::replying(vec![(
            0,
            "__PFCONF_BEGIN__\"firewall1\"__PFCONF_END__\n",
        )]);
        let config = AgentConfig {
            detect_changes: true,
            ..AgentConfig::default()
        };
        let outcome = route_params(
            &console,
            &config,
            json!({"option": "hostname", "value": "firewall1"}),
        )
        .unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.rc, 0);
        assert_eq!(console.invocations(), 1);
    }

    #[test]
    fn change_detection_writes_on_difference() {
        let console = RecordingConsole::replying(vec![(
            0,
            "__PFCONF_BEGIN__[\"8.8.8.8\"]__PFCONF_END__",
        )]);
        let config = AgentConfig {
            detect_changes: true,
            ..AgentConfig::default()
        };
        let outcome = route_params(
            &console,
            &config,
            json!({"option": "dns", "value": ["8.8.8.8", "1.1.1.1"]}),
        )
        .unwrap();
        assert!(outcome.changed);
        assert_eq!(console.invocations(), 2);
        assert!(console.scripts.borrow()[1]
            .statements()
            .contains(&"write_config();".to_string()));
    }

    #[test]
    fn change_detection_compares_ntp_joined_form() {
        let console = RecordingConsole::replying(vec![(
            0,
            "__PFCONF_BEGIN__\"0.pool.ntp.org 1.pool.ntp.org\"__PFCONF_END__",
        )]);
        let config = AgentConfig {
            detect_changes: true,
            ..AgentConfig::default()
        };
        let outcome = route_params(
            &console,
            &config,
            json!({"option": "ntptimeserver", "value": ["0.pool.ntp.org", "1.pool.ntp.org"]}),
        )
        .unwrap();
        assert!(!outcome.changed);
        assert_eq!(console.invocations(), 1);
    }

    #[test]
    fn unreadable_current_value_falls_back_to_write() {
        let console = RecordingConsole::replying(vec![(1, "parse error")]);
        let config = AgentConfig {
            detect_changes: true,
            ..AgentConfig::default()
        };
        let outcome = route_params(
            &console,
            &config,
            json!({"option": "domain", "value": "lan.example"}),
        )
        .unwrap();
        assert!(outcome.changed);
        assert_eq!(console.invocations(), 2);
    }

    #[test]
    fn check_mode_launches_nothing() {
        let console = RecordingConsole::echoing();
        let intent = OptionIntent {
            kind: OptionKind::Hostname,
            value: OptionValue::Scalar("fw2".into()),
        };
        let outcome = OptionRouter::new(&console, &AgentConfig::default(), true)
            .unwrap()
            .route(&intent)
            .unwrap();
        assert!(outcome.check_mode);
        assert!(outcome.changed);
        assert!(outcome
            .stdout
            .contains("$config['system']['hostname'] = 'fw2';"));
        assert_eq!(console.invocations(), 0);
    }
}
