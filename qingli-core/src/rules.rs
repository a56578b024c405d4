//! 规则引擎
//!
//! 规则集由若干条规则组成，每条规则是一个启用开关加一组条件。
//! 所有启用的规则都必须成立（规则内部的条件也全部成立），条目才会被判定为需要删除。

use crate::metrics::DerivedMetrics;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::Error as _,
};
use serde_json::Value;
use std::{collections::BTreeMap, fmt};
use tracing::debug;

/// 未配置任何规则时的判定结果：全部删除
pub const VERDICT_WITHOUT_RULES: bool = true;

/// 条件种类，对应配置文件中的 `C1`..`C5`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    /// 已下载时间超过阈值（分钟）
    C1,
    /// 状态属于给定集合
    C2,
    /// 平均速度低于阈值（KB/s）
    C3,
    /// 预计剩余时间超过阈值（分钟）
    C4,
    /// 进度低于阈值（%）
    C5,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 5] = [
        ConditionKind::C1,
        ConditionKind::C2,
        ConditionKind::C3,
        ConditionKind::C4,
        ConditionKind::C5,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ConditionKind::C1 => "C1",
            ConditionKind::C2 => "C2",
            ConditionKind::C3 => "C3",
            ConditionKind::C4 => "C4",
            ConditionKind::C5 => "C5",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }

    /// 表单上显示的字段名
    pub fn label(self) -> &'static str {
        match self {
            ConditionKind::C1 => "downloaded_time",
            ConditionKind::C2 => "status",
            ConditionKind::C3 => "avg_speed",
            ConditionKind::C4 => "estimated_time",
            ConditionKind::C5 => "progress",
        }
    }

    /// 阈值单位
    pub fn unit(self) -> &'static str {
        match self {
            ConditionKind::C1 | ConditionKind::C4 => "min",
            ConditionKind::C2 => "",
            ConditionKind::C3 => "kb/s",
            ConditionKind::C5 => "%",
        }
    }
}

/// 单个条件
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    ElapsedOver { minutes: f64 },
    StatusIn { statuses: Vec<String> },
    SpeedBelow { kbps: f64 },
    EstimatedOver { minutes: f64 },
    ProgressBelow { percent: f64 },
}

impl Condition {
    pub fn kind(&self) -> ConditionKind {
        match self {
            Condition::ElapsedOver { .. } => ConditionKind::C1,
            Condition::StatusIn { .. } => ConditionKind::C2,
            Condition::SpeedBelow { .. } => ConditionKind::C3,
            Condition::EstimatedOver { .. } => ConditionKind::C4,
            Condition::ProgressBelow { .. } => ConditionKind::C5,
        }
    }

    /// 针对当前指标检查条件是否成立
    pub fn check(&self, metrics: &DerivedMetrics, status: &str) -> bool {
        let result = match self {
            Condition::ElapsedOver { minutes } => metrics.elapsed_minutes() > *minutes,
            Condition::StatusIn { statuses } => statuses.iter().any(|s| s == status),
            Condition::SpeedBelow { kbps } => metrics.average_speed_bps < kbps * 1024.0,
            Condition::EstimatedOver { minutes } => *minutes < metrics.estimated_remaining_minutes,
            Condition::ProgressBelow { percent } => *percent > metrics.percent_complete,
        };
        debug!(condition = %self, result, "rule condition checked");
        result
    }

    /// 从配置值解析条件；`None` 表示该键未设置
    pub fn parse(kind: ConditionKind, value: &Value) -> Result<Option<Self>, String> {
        if value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty()) {
            return Ok(None);
        }

        let condition = match kind {
            ConditionKind::C1 => Condition::ElapsedOver {
                minutes: parse_threshold(kind, value)?,
            },
            ConditionKind::C2 => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| format!("condition C2 expects a status list, got {value}"))?;
                Condition::StatusIn {
                    statuses: raw
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                }
            }
            ConditionKind::C3 => Condition::SpeedBelow {
                kbps: parse_threshold(kind, value)?,
            },
            ConditionKind::C4 => Condition::EstimatedOver {
                minutes: parse_threshold(kind, value)?,
            },
            ConditionKind::C5 => Condition::ProgressBelow {
                percent: parse_threshold(kind, value)?,
            },
        };
        Ok(Some(condition))
    }

    fn to_value(&self) -> Value {
        match self {
            Condition::ElapsedOver { minutes } | Condition::EstimatedOver { minutes } => {
                Value::from(*minutes)
            }
            Condition::StatusIn { statuses } => Value::from(statuses.join(",")),
            Condition::SpeedBelow { kbps } => Value::from(*kbps),
            Condition::ProgressBelow { percent } => Value::from(*percent),
        }
    }
}

fn parse_threshold(kind: ConditionKind, value: &Value) -> Result<f64, String> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("condition {} expects a number, got {value}", kind.key()))
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::ElapsedOver { minutes } => write!(f, "C1 elapsed > {minutes}min"),
            Condition::StatusIn { statuses } => write!(f, "C2 status in [{}]", statuses.join(",")),
            Condition::SpeedBelow { kbps } => write!(f, "C3 speed < {kbps}KB/s"),
            Condition::EstimatedOver { minutes } => write!(f, "C4 estimated > {minutes}min"),
            Condition::ProgressBelow { percent } => write!(f, "C5 progress < {percent}%"),
        }
    }
}

/// 一条规则：启用开关加一组必须同时成立的条件
///
/// 在配置文件中表示为二元数组 `[true, {"C1": 5, "C3": 50}]`。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rule {
    pub enabled: bool,
    pub conditions: Vec<Condition>,
}

impl Rule {
    pub fn new(enabled: bool, conditions: Vec<Condition>) -> Self {
        Self {
            enabled,
            conditions,
        }
    }

    /// 所有条件都成立时返回 true，没有条件时恒为 true
    pub fn matches(&self, metrics: &DerivedMetrics, status: &str) -> bool {
        let mut result = true;
        for condition in &self.conditions {
            result &= condition.check(metrics, status);
        }
        result
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let conditions: BTreeMap<&'static str, Value> = self
            .conditions
            .iter()
            .map(|c| (c.kind().key(), c.to_value()))
            .collect();
        (self.enabled, conditions).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (enabled, raw): (bool, BTreeMap<String, Value>) =
            Deserialize::deserialize(deserializer)?;

        let mut conditions = Vec::with_capacity(raw.len());
        for (key, value) in &raw {
            let Some(kind) = ConditionKind::from_key(key) else {
                debug!(key = %key, "ignoring unknown rule condition");
                continue;
            };
            if let Some(condition) = Condition::parse(kind, value).map_err(D::Error::custom)? {
                conditions.push(condition);
            }
        }

        Ok(Self {
            enabled,
            conditions,
        })
    }
}

/// 有序的规则集合，顺序只影响展示
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet(Vec<Rule>);

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self(rules)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 所有启用规则的结果做与运算；禁用的规则不影响结果
    pub fn evaluate(&self, metrics: &DerivedMetrics, status: &str) -> bool {
        if self.is_empty() {
            return VERDICT_WITHOUT_RULES;
        }

        let mut verdict = true;
        for rule in self.0.iter().filter(|rule| rule.enabled) {
            verdict &= rule.matches(metrics, status);
        }
        verdict
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(rules: Vec<Rule>) -> Self {
        Self(rules)
    }
}

/// 对条目做出是否删除的判定
///
/// 规则集缺失或为空时返回 [`VERDICT_WITHOUT_RULES`]。
pub fn evaluate(rule_set: Option<&RuleSet>, metrics: &DerivedMetrics, status: &str) -> bool {
    let verdict = match rule_set {
        Some(rules) if !rules.is_empty() => rules.evaluate(metrics, status),
        _ => {
            debug!("no rules configured");
            VERDICT_WITHOUT_RULES
        }
    };
    debug!(verdict, "rule evaluation finished");
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metrics::derive,
        types::{ItemId, QueueItem},
    };
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn metrics(size: f64, size_left: f64, elapsed: Duration) -> DerivedMetrics {
        let now = Utc::now();
        let item = QueueItem {
            id: ItemId::Number(1),
            title: "item".to_string(),
            size,
            size_left,
            added: now - elapsed,
            status: "downloading".to_string(),
        };
        derive(&item, now)
    }

    fn rules(value: Value) -> RuleSet {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_or_absent_rules_delete() {
        let m = metrics(1000.0, 1000.0, Duration::zero());
        assert!(evaluate(None, &m, "queued"));
        assert!(evaluate(Some(&RuleSet::default()), &m, "queued"));
        assert!(evaluate(Some(&RuleSet::default()), &m, ""));
    }

    #[test]
    fn test_status_not_in_list() {
        let set = rules(json!([[true, { "C2": "downloading,queued" }]]));
        let m = metrics(1000.0, 500.0, Duration::minutes(1));
        assert!(!evaluate(Some(&set), &m, "paused"));
        assert!(evaluate(Some(&set), &m, "queued"));
    }

    #[test]
    fn test_status_labels_are_trimmed() {
        let set = rules(json!([[true, { "C2": " warning , downloading ," }]]));
        let m = metrics(1000.0, 500.0, Duration::minutes(1));
        assert!(evaluate(Some(&set), &m, "downloading"));
        assert!(!evaluate(Some(&set), &m, ""));
    }

    #[test]
    fn test_disabled_rule_has_no_effect() {
        let m = metrics(1000.0, 200.0, Duration::minutes(10));
        let cases = [
            json!([[true, { "C1": 5 }]]),
            json!([[true, { "C1": 50 }]]),
            json!([[true, { "C2": "paused" }]]),
        ];
        for case in cases {
            let base = rules(case.clone());
            let mut with_disabled = case.as_array().unwrap().clone();
            with_disabled.push(json!([false, { "C2": "never" }]));
            with_disabled.insert(0, json!([false, { "C1": 0 }]));
            let extended = rules(Value::Array(with_disabled));
            assert_eq!(
                evaluate(Some(&base), &m, "downloading"),
                evaluate(Some(&extended), &m, "downloading"),
                "{case}"
            );
        }
    }

    #[test]
    fn test_only_disabled_rules_delete() {
        let set = rules(json!([[false, { "C1": 1000 }]]));
        let m = metrics(1000.0, 1000.0, Duration::zero());
        assert!(evaluate(Some(&set), &m, "queued"));
    }

    #[test]
    fn test_fresh_item_not_deleted() {
        let set = rules(json!([[true, { "C1": 5 }]]));
        let m = metrics(1000.0, 1000.0, Duration::zero());
        assert!(!evaluate(Some(&set), &m, "queued"));
    }

    #[test]
    fn test_slow_item_deleted() {
        let set = rules(json!([[true, { "C3": 50 }]]));
        let m = metrics(1000.0, 200.0, Duration::minutes(10));
        assert!(m.average_speed_bps < 50.0 * 1024.0);
        assert!(evaluate(Some(&set), &m, "downloading"));
    }

    #[test]
    fn test_rule_blocks_are_anded() {
        let set = rules(json!([[true, { "C1": 5 }], [true, { "C2": "warning" }]]));
        let m = metrics(1000.0, 200.0, Duration::minutes(10));
        assert!(set.rules()[0].matches(&m, "downloading"));
        assert!(!set.rules()[1].matches(&m, "downloading"));
        assert!(!evaluate(Some(&set), &m, "downloading"));
        assert!(evaluate(Some(&set), &m, "warning"));
    }

    #[test]
    fn test_rule_without_conditions_matches() {
        let set = rules(json!([[true, {}]]));
        let m = metrics(1000.0, 1000.0, Duration::zero());
        assert!(evaluate(Some(&set), &m, "queued"));
    }

    #[test]
    fn test_estimated_time_and_progress() {
        // 10 分钟下载了 100 字节，剩余 900 字节需要 90 分钟
        let m = metrics(1000.0, 900.0, Duration::minutes(10));
        assert!(Condition::EstimatedOver { minutes: 60.0 }.check(&m, ""));
        assert!(!Condition::EstimatedOver { minutes: 120.0 }.check(&m, ""));
        assert!(Condition::ProgressBelow { percent: 50.0 }.check(&m, ""));
        assert!(!Condition::ProgressBelow { percent: 10.0 }.check(&m, ""));
    }

    #[test]
    fn test_stalled_item_has_infinite_estimate() {
        let m = metrics(1000.0, 1000.0, Duration::minutes(30));
        assert!(Condition::EstimatedOver { minutes: 100_000.0 }.check(&m, ""));
        assert!(Condition::SpeedBelow { kbps: 0.001 }.check(&m, ""));
    }

    #[test]
    fn test_deserialize_form_strings_and_unknown_keys() {
        let set = rules(json!([[true, { "C1": "5", "C3": " 50.5 ", "C9": "x", "C5": null }]]));
        assert_eq!(
            set.rules()[0].conditions,
            vec![
                Condition::ElapsedOver { minutes: 5.0 },
                Condition::SpeedBelow { kbps: 50.5 },
            ]
        );
    }

    #[test]
    fn test_deserialize_rejects_bad_threshold() {
        let err = serde_json::from_value::<RuleSet>(json!([[true, { "C1": "soon" }]]));
        assert!(err.is_err());
        let err = serde_json::from_value::<RuleSet>(json!([[true, { "C4": [1] }]]));
        assert!(err.is_err());
    }

    #[test]
    fn test_serialize_pair_shape() {
        let set = RuleSet::new(vec![Rule::new(
            true,
            vec![
                Condition::StatusIn {
                    statuses: vec!["warning".into(), "queued".into()],
                },
                Condition::ElapsedOver { minutes: 5.0 },
            ],
        )]);
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value, json!([[true, { "C1": 5.0, "C2": "warning,queued" }]]));
    }

    #[test]
    fn test_condition_kind_keys() {
        for kind in ConditionKind::ALL {
            assert_eq!(ConditionKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(ConditionKind::from_key("C6"), None);
    }
}
