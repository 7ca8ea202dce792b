//! Firewall rule intents.
//!
//! Only the state transition is modelled. `present` reloads the filter subsystem and
//! `absent` does nothing; neither edits the rule table. Both say so in the outcome's
//! warnings instead of passing for a real change.

use crate::pfsense::console::Console;
use crate::pfsense::report::{report, ExecutionOutcome};
use crate::pfsense::script::compose_filter_reload;
use crate::utils::error::AgentError;
use log::{info, warn};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const RULE_NOT_INSERTED: &str =
    "rule insertion is not implemented: the filter was reloaded but no rule was added";
pub const RULE_NOT_REMOVED: &str =
    "rule removal is not implemented: nothing was changed on the appliance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    #[default]
    Pass,
    Block,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum IpVersion {
    #[default]
    #[serde(rename = "ipv4")]
    V4,
    #[serde(rename = "ipv6")]
    V6,
    #[serde(rename = "ipv4+ipv6")]
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Tcpudp,
    Icmp,
    Esp,
    Ah,
    Gre,
    Ipv6,
    Igmp,
    Ospf,
    Any,
    Carp,
    Pfsync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
}

fn any() -> String {
    String::from("any")
}

/// Accepts `true`/`false` as JSON booleans or as strings.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }
    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(t) => match t.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected true or false, got {:?}",
                other
            ))),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleIntent {
    pub name: String,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default, deserialize_with = "flag")]
    pub disabled: bool,
    pub interface: String,
    #[serde(default, alias = "tcpipversion")]
    pub ip_version: IpVersion,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "any")]
    pub source: String,
    #[serde(default = "any", alias = "sourceport")]
    pub source_port: String,
    #[serde(default = "any")]
    pub destination: String,
    #[serde(default = "any", alias = "destinationport")]
    pub destination_port: String,
    #[serde(default, deserialize_with = "flag")]
    pub log: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "state")]
    pub desired_state: DesiredState,
}

impl RuleIntent {
    pub fn from_params(params: &Value) -> Result<RuleIntent, AgentError> {
        RuleIntent::deserialize(params).map_err(|e| AgentError::Validation(e.to_string()))
    }
}

pub struct RuleMachine<'a, C: Console> {
    console: &'a C,
    check_mode: bool,
}

impl<'a, C: Console> RuleMachine<'a, C> {
    pub fn new(console: &'a C, check_mode: bool) -> RuleMachine<'a, C> {
        RuleMachine {
            console,
            check_mode,
        }
    }

    pub fn apply(&self, intent: &RuleIntent) -> Result<ExecutionOutcome, AgentError> {
        match intent.desired_state {
            DesiredState::Present => {
                info!(
                    "Rule {} ({:?} {:?} on {}) requested present",
                    intent.name, intent.action, intent.protocol, intent.interface
                );
                warn!("{}", RULE_NOT_INSERTED);
                let script = compose_filter_reload();
                if self.check_mode {
                    return Ok(ExecutionOutcome::planned(&self.console.command(), &script)
                        .warn(RULE_NOT_INSERTED));
                }
                let raw = self.console.execute(&script)?;
                Ok(report(raw, &self.console.command()).warn(RULE_NOT_INSERTED))
            }
            DesiredState::Absent => {
                info!("Rule {} requested absent", intent.name);
                warn!("{}", RULE_NOT_REMOVED);
                let mut outcome =
                    ExecutionOutcome::without_session("remove_rule", String::new())
                        .warn(RULE_NOT_REMOVED);
                outcome.check_mode = self.check_mode;
                Ok(outcome)
            }
        }
    }
}
