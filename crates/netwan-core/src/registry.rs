//! Member Registry (C2) — discovers, classifies, and maintains the live
//! uplink inventory, merged against the previous tick's state so mutable
//! fields update in place instead of members being recreated every tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use netwan_types::models::{Member, MemberClass, PolicyHints};
use tracing::warn;

use crate::adapters::{PolicyMember, RouterAdapter};

/// Classifies a policy member by combining the adapter's class hint with
/// policy flags, falling back to interface-name heuristics, and finally to
/// `generic` — classification is deterministic and total, so every policy
/// member yields exactly one [`MemberClass`].
pub fn classify(policy: &PolicyMember) -> MemberClass {
    if let Some(hint) = policy.class_hint.as_deref() {
        match hint.to_ascii_lowercase().as_str() {
            "starlink" => return MemberClass::Starlink,
            "cellular" => return MemberClass::Cellular,
            "wifi" | "wlan" => return MemberClass::Wifi,
            "lan" | "ethernet" => return MemberClass::Lan,
            _ => {}
        }
    }

    if policy.metered {
        return MemberClass::Cellular;
    }

    let iface = policy.iface.to_ascii_lowercase();
    if iface.starts_with("wwan") || iface.starts_with("ppp") || iface.starts_with("rmnet") {
        MemberClass::Cellular
    } else if iface.starts_with("wlan") || iface.starts_with("wlp") {
        MemberClass::Wifi
    } else if iface.contains("starlink") || iface.starts_with("stl") {
        MemberClass::Starlink
    } else if iface.starts_with("eth") || iface.starts_with("en") || iface.starts_with("lan") {
        MemberClass::Lan
    } else {
        MemberClass::Generic
    }
}

pub struct MemberRegistry {
    adapter: Arc<dyn RouterAdapter>,
    members: RwLock<HashMap<String, Member>>,
    max_missed_refreshes: u32,
    removed: Mutex<Vec<String>>,
}

impl MemberRegistry {
    pub fn new(adapter: Arc<dyn RouterAdapter>, max_missed_refreshes: u32) -> Self {
        Self {
            adapter,
            members: RwLock::new(HashMap::new()),
            max_missed_refreshes,
            removed: Mutex::new(Vec::new()),
        }
    }

    /// Pulls the host's policy members, merges them into the in-memory
    /// registry, and garbage-collects members absent too many consecutive
    /// refreshes. Discovery failures are logged and swallowed: the last
    /// good inventory stays active and is returned unchanged.
    pub async fn refresh(&self) -> Vec<Member> {
        let policy_members = match self.adapter.list_policy_members().await {
            Ok(members) => members,
            Err(err) => {
                warn!(error = %err, "member discovery failed, keeping last known inventory");
                return self.snapshot();
            }
        };

        let seen_names: Vec<String> = policy_members.iter().map(|p| p.name.clone()).collect();
        let now = Utc::now();

        let mut members = self.members.write().expect("registry lock poisoned");

        for policy in &policy_members {
            let class = classify(policy);
            let hints = PolicyHints {
                prefer_roaming: policy.prefer_roaming,
                metered: policy.metered,
                min_uptime_s: policy.min_uptime_s,
                cooldown_s: policy.cooldown_s,
            };

            members
                .entry(policy.name.clone())
                .and_modify(|m| {
                    m.iface = policy.iface.clone();
                    m.weight = policy.weight;
                    m.eligible = policy.weight > 0;
                    m.hints = hints;
                    m.missed_refreshes = 0;
                })
                .or_insert_with(|| Member {
                    name: policy.name.clone(),
                    class,
                    iface: policy.iface.clone(),
                    weight: policy.weight,
                    eligible: policy.weight > 0,
                    created_at: now,
                    hints,
                    missed_refreshes: 0,
                    consecutive_up_ticks: 0,
                    cooldown_until: None,
                    last_failure_at: None,
                });
        }

        let mut gone = Vec::new();
        for (name, member) in members.iter_mut() {
            if !seen_names.contains(name) {
                member.missed_refreshes += 1;
                if member.missed_refreshes > self.max_missed_refreshes {
                    gone.push(name.clone());
                }
            }
        }
        for name in &gone {
            members.remove(name);
        }
        if !gone.is_empty() {
            self.removed.lock().expect("registry lock poisoned").extend(gone);
        }

        members.values().cloned().collect()
    }

    /// Drains the names garbage-collected since the last call, so a caller
    /// (the scheduler) can evict their telemetry-store state too. A
    /// member's ring buffer is otherwise leaked forever past GC.
    pub fn drain_removed(&self) -> Vec<String> {
        std::mem::take(&mut *self.removed.lock().expect("registry lock poisoned"))
    }

    pub fn snapshot(&self) -> Vec<Member> {
        self.members
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Member> {
        self.members
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Records a fresh consecutive-up tick or resets the streak, used by
    /// the scheduler after each collector pass to drive uptime-based
    /// eligibility gating.
    pub fn record_liveness(&self, name: &str, up: bool) {
        let mut members = self.members.write().expect("registry lock poisoned");
        if let Some(member) = members.get_mut(name) {
            if up {
                member.consecutive_up_ticks += 1;
            } else {
                member.consecutive_up_ticks = 0;
            }
        }
    }

    pub fn set_cooldown(&self, name: &str, until: chrono::DateTime<Utc>) {
        let mut members = self.members.write().expect("registry lock poisoned");
        if let Some(member) = members.get_mut(name) {
            member.cooldown_until = Some(until);
            member.last_failure_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ExecOutput;
    use async_trait::async_trait;
    use netwan_types::error::{CoreError, CoreResult};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeAdapter {
        members: Mutex<Vec<PolicyMember>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl RouterAdapter for FakeAdapter {
        async fn list_policy_members(&self) -> CoreResult<Vec<PolicyMember>> {
            if *self.fail.lock().unwrap() {
                return Err(CoreError::AdapterUnavailable("down".into()));
            }
            Ok(self.members.lock().unwrap().clone())
        }
        async fn set_member_weight(&self, _: &str, _: u32) -> CoreResult<()> {
            Ok(())
        }
        async fn set_member_metric(&self, _: &str, _: u32) -> CoreResult<()> {
            Ok(())
        }
        async fn reload_policy(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn config_get(&self, _: &str) -> CoreResult<Option<String>> {
            Ok(None)
        }
        async fn config_set(&self, _: &str, _: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn config_commit(&self, _: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn bus_call(&self, _: &str, _: &str, _: serde_json::Value) -> CoreResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn exec(&self, _: &str, _: &[String], _: Duration) -> CoreResult<ExecOutput> {
            Ok(ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit: 0,
            })
        }
    }

    fn policy(name: &str, iface: &str, metered: bool) -> PolicyMember {
        PolicyMember {
            name: name.to_string(),
            class_hint: None,
            iface: iface.to_string(),
            weight: 100,
            metered,
            prefer_roaming: false,
            min_uptime_s: 10,
            cooldown_s: 20,
        }
    }

    #[test]
    fn classifies_by_iface_heuristic() {
        assert_eq!(classify(&policy("a", "wwan0", false)), MemberClass::Cellular);
        assert_eq!(classify(&policy("a", "wlan0", false)), MemberClass::Wifi);
        assert_eq!(classify(&policy("a", "eth0", false)), MemberClass::Lan);
        assert_eq!(classify(&policy("a", "tun0", false)), MemberClass::Generic);
    }

    #[test]
    fn metered_forces_cellular_even_without_hint() {
        assert_eq!(classify(&policy("a", "eth0", true)), MemberClass::Cellular);
    }

    #[tokio::test]
    async fn refresh_adds_and_garbage_collects_members() {
        let adapter = Arc::new(FakeAdapter {
            members: Mutex::new(vec![policy("wan_a", "wwan0", false)]),
            fail: Mutex::new(false),
        });
        let registry = MemberRegistry::new(adapter.clone(), 1);

        let snapshot = registry.refresh().await;
        assert_eq!(snapshot.len(), 1);

        adapter.members.lock().unwrap().clear();
        registry.refresh().await; // miss 1, still within budget
        assert!(registry.get("wan_a").is_some());

        registry.refresh().await; // miss 2, exceeds max_missed_refreshes=1
        assert!(registry.get("wan_a").is_none());
        assert_eq!(registry.drain_removed(), vec!["wan_a".to_string()]);
        assert!(registry.drain_removed().is_empty(), "drain_removed empties the buffer");
    }

    #[tokio::test]
    async fn refresh_keeps_last_good_inventory_on_failure() {
        let adapter = Arc::new(FakeAdapter {
            members: Mutex::new(vec![policy("wan_a", "wwan0", false)]),
            fail: Mutex::new(false),
        });
        let registry = MemberRegistry::new(adapter.clone(), 3);
        registry.refresh().await;

        *adapter.fail.lock().unwrap() = true;
        let snapshot = registry.refresh().await;
        assert_eq!(snapshot.len(), 1, "last known inventory should survive a discovery failure");
    }
}
