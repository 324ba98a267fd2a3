//! Firewall configuration loaded from TOML.
//!
//! A configuration declares policies by name and then replays the admin
//! operations a deployment would issue: enable policies, fill allowlists,
//! approve calls, configure combinations, attach to consumers.

use crate::{
    AccessControl, Address, AllowlistPolicy, ApprovedCall, ApprovedCallsPolicy, CombinedPolicy,
    Error, FirewallRegistry, FixedPolicy, Policy, PolicyKind, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallConfig {
    /// Initial holder of the admin role; every operation below is issued by it.
    pub admin: Address,

    #[serde(default)]
    pub policies: Vec<PolicySpec>,

    #[serde(default)]
    pub allowlists: Vec<AllowlistSpec>,

    #[serde(default)]
    pub approved_calls: Vec<ApprovedCallsSpec>,

    #[serde(default)]
    pub combinations: Vec<CombinationSpec>,

    #[serde(default)]
    pub attachments: Vec<AttachmentSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySpec {
    pub name: String,
    pub kind: PolicyKind,
    pub address: Address,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Verdict of a `fixed` policy.
    #[serde(default)]
    pub verdict: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowlistSpec {
    pub policy: String,
    pub consumer: Address,
    pub addresses: Vec<Address>,
    #[serde(default = "default_true")]
    pub value: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovedCallsSpec {
    pub policy: String,
    pub caller: Address,
    pub calls: Vec<ApprovedCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombinationSpec {
    pub policy: String,
    pub sub_policies: Vec<String>,
    pub accepted_rows: Vec<Vec<bool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentSpec {
    pub policy: String,
    pub consumers: Vec<Address>,
}

fn default_true() -> bool {
    true
}

/// A typed handle to a configured policy.
#[derive(Debug, Clone)]
pub enum PolicyHandle {
    Allowlist(Arc<AllowlistPolicy>),
    ApprovedCalls(Arc<ApprovedCallsPolicy>),
    Combined(Arc<CombinedPolicy>),
    Fixed(Arc<FixedPolicy>),
}

impl PolicyHandle {
    pub fn as_policy(&self) -> Arc<dyn Policy> {
        match self {
            Self::Allowlist(p) => p.clone(),
            Self::ApprovedCalls(p) => p.clone(),
            Self::Combined(p) => p.clone(),
            Self::Fixed(p) => p.clone(),
        }
    }
}

/// A registry built from configuration, plus handles to its policies.
#[derive(Debug)]
pub struct Firewall {
    pub admin: Address,
    pub registry: Arc<FirewallRegistry>,
    pub policies: BTreeMap<String, PolicyHandle>,
}

impl Firewall {
    pub fn policy(&self, name: &str) -> Result<&PolicyHandle> {
        self.policies
            .get(name)
            .ok_or_else(|| Error::config(format!("unknown policy '{name}'")))
    }

    pub fn allowlist(&self, name: &str) -> Result<&Arc<AllowlistPolicy>> {
        match self.policy(name)? {
            PolicyHandle::Allowlist(p) => Ok(p),
            _ => Err(Error::config(format!("policy '{name}' is not an allowlist"))),
        }
    }

    pub fn approved_calls(&self, name: &str) -> Result<&Arc<ApprovedCallsPolicy>> {
        match self.policy(name)? {
            PolicyHandle::ApprovedCalls(p) => Ok(p),
            _ => Err(Error::config(format!("policy '{name}' is not an approved-calls policy"))),
        }
    }

    pub fn combined(&self, name: &str) -> Result<&Arc<CombinedPolicy>> {
        match self.policy(name)? {
            PolicyHandle::Combined(p) => Ok(p),
            _ => Err(Error::config(format!("policy '{name}' is not a combined policy"))),
        }
    }
}

impl FirewallConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Build the registry by replaying the configured admin operations.
    pub fn build(&self) -> Result<Firewall> {
        let access = AccessControl::new(self.admin);
        let registry = Arc::new(FirewallRegistry::new(access.clone()));
        let mut policies = BTreeMap::new();

        for spec in &self.policies {
            if policies.contains_key(&spec.name) {
                return Err(Error::config(format!("duplicate policy name '{}'", spec.name)));
            }
            let handle = match spec.kind {
                PolicyKind::Allowlist => PolicyHandle::Allowlist(Arc::new(AllowlistPolicy::new(
                    spec.address,
                    access.clone(),
                ))),
                PolicyKind::ApprovedCalls => PolicyHandle::ApprovedCalls(Arc::new(
                    ApprovedCallsPolicy::new(spec.address, access.clone()),
                )),
                PolicyKind::Combined => PolicyHandle::Combined(Arc::new(CombinedPolicy::new(
                    spec.address,
                    access.clone(),
                ))),
                PolicyKind::Fixed => {
                    let verdict = spec.verdict.ok_or_else(|| {
                        Error::config(format!("fixed policy '{}' needs a verdict", spec.name))
                    })?;
                    PolicyHandle::Fixed(Arc::new(FixedPolicy::new(spec.address, verdict)))
                }
            };
            registry.set_policy_status(self.admin, handle.as_policy(), spec.enabled)?;
            policies.insert(spec.name.clone(), handle);
        }

        let firewall = Firewall {
            admin: self.admin,
            registry,
            policies,
        };

        for spec in &self.allowlists {
            firewall.allowlist(&spec.policy)?.set_consumer_allowlist(
                self.admin,
                spec.consumer,
                &spec.addresses,
                spec.value,
            )?;
        }

        for spec in &self.approved_calls {
            firewall
                .approved_calls(&spec.policy)?
                .approve_calls(self.admin, spec.caller, &spec.calls)?;
        }

        for spec in &self.combinations {
            let subs = spec
                .sub_policies
                .iter()
                .map(|name| firewall.policy(name).map(PolicyHandle::as_policy))
                .collect::<Result<Vec<_>>>()?;
            firewall.combined(&spec.policy)?.set_allowed_combinations(
                self.admin,
                subs,
                spec.accepted_rows.clone(),
            )?;
        }

        for spec in &self.attachments {
            let address = firewall.policy(&spec.policy)?.as_policy().policy_ref().address;
            firewall
                .registry
                .add_global_policy_for_consumers(self.admin, &spec.consumers, address)?;
        }

        Ok(firewall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Calldata, TransactionRequest};

    const CONFIG: &str = r#"
admin = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"

[[policies]]
name = "approved"
kind = "approved_calls"
address = "0x00000000000000000000000000000000000000a2"

[[policies]]
name = "allowlist"
kind = "allowlist"
address = "0x00000000000000000000000000000000000000a1"

[[policies]]
name = "combined"
kind = "combined"
address = "0x00000000000000000000000000000000000000cc"

[[allowlists]]
policy = "allowlist"
consumer = "0x00000000000000000000000000000000000000c0"
addresses = ["0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"]

[[approved_calls]]
policy = "approved"
caller = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
calls = [{ target = "0x00000000000000000000000000000000000000c0", selector = "0xd0e30db0" }]

[[combinations]]
policy = "combined"
sub_policies = ["approved", "allowlist"]
accepted_rows = [[true, true]]

[[attachments]]
policy = "combined"
consumers = ["0x00000000000000000000000000000000000000c0"]
"#;

    fn deposit(from: &str) -> TransactionRequest {
        TransactionRequest::new(
            from.parse().unwrap(),
            "0x00000000000000000000000000000000000000c0".parse().unwrap(),
        )
        .with_data("0xd0e30db0".parse::<Calldata>().unwrap())
    }

    #[test]
    fn builds_combined_firewall() {
        let firewall = FirewallConfig::parse(CONFIG).unwrap().build().unwrap();
        let consumer: Address = "0x00000000000000000000000000000000000000c0".parse().unwrap();

        let active = firewall.registry.get_active_global_policies(consumer);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, PolicyKind::Combined);

        let admin = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        assert!(firewall.registry.evaluate(&deposit(admin)).is_allowed());

        // Not approved and not allowlisted.
        let stranger = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
        assert!(!firewall.registry.evaluate(&deposit(stranger)).is_allowed());
    }

    #[test]
    fn rejects_unknown_fields() {
        let bad = r#"
admin = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
[[policies]]
name = "a"
kind = "allowlist"
adress = "0x00000000000000000000000000000000000000a1"
"#;
        assert!(matches!(FirewallConfig::parse(bad), Err(Error::Parse(_))));
    }

    #[test]
    fn fixed_policy_needs_verdict() {
        let cfg = r#"
admin = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
[[policies]]
name = "kill_switch"
kind = "fixed"
address = "0x00000000000000000000000000000000000000f0"
"#;
        let err = FirewallConfig::parse(cfg).unwrap().build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn unknown_policy_reference_fails() {
        let cfg = r#"
admin = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
[[attachments]]
policy = "missing"
consumers = ["0x00000000000000000000000000000000000000c0"]
"#;
        let err = FirewallConfig::parse(cfg).unwrap().build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
