use super::model::{Activity, OutcomeId};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Ordering used by auto-fill to decide which activities claim slots first.
/// `Ordering::Less` means "schedule earlier". Implementations must be total and
/// deterministic; `sort_candidates` appends an id tiebreak regardless.
pub trait PriorityOrder {
    fn compare(&self, a: &Activity, b: &Activity) -> Ordering;

    fn name(&self) -> &'static str;
}

/// Plain ascending id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByActivityId;

impl PriorityOrder for ByActivityId {
    fn compare(&self, _a: &Activity, _b: &Activity) -> Ordering {
        Ordering::Equal
    }

    fn name(&self) -> &'static str {
        "id"
    }
}

/// Activities that still teach an uncovered outcome go first.
#[derive(Debug, Clone, Default)]
pub struct OutcomeCoverageFirst {
    covered: HashSet<OutcomeId>,
}

impl OutcomeCoverageFirst {
    pub fn new(covered: HashSet<OutcomeId>) -> Self {
        Self { covered }
    }

    pub fn needs_coverage(&self, activity: &Activity) -> bool {
        activity
            .outcome_ids
            .iter()
            .any(|o| !self.covered.contains(o))
    }
}

impl PriorityOrder for OutcomeCoverageFirst {
    fn compare(&self, a: &Activity, b: &Activity) -> Ordering {
        // true sorts before false
        self.needs_coverage(b).cmp(&self.needs_coverage(a))
    }

    fn name(&self) -> &'static str {
        "coverage"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityKind {
    #[default]
    Coverage,
    Id,
}

impl PriorityKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coverage" => Some(Self::Coverage),
            "id" => Some(Self::Id),
            _ => None,
        }
    }

    pub fn build(self, covered: HashSet<OutcomeId>) -> Box<dyn PriorityOrder> {
        match self {
            Self::Coverage => Box::new(OutcomeCoverageFirst::new(covered)),
            Self::Id => Box::new(ByActivityId),
        }
    }
}

pub fn sort_candidates(candidates: &mut [&Activity], order: &dyn PriorityOrder) {
    candidates.sort_by(|a, b| order.compare(a, b).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: i64, outcomes: &[&str]) -> Activity {
        Activity {
            id,
            title: format!("A{}", id),
            subject_id: Some("math".into()),
            duration_mins: None,
            outcome_ids: outcomes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn uncovered_outcomes_sort_first_then_id() {
        let a1 = activity(1, &["o1"]);
        let a2 = activity(2, &["o2"]);
        let a3 = activity(3, &[]);
        let a4 = activity(4, &["o1", "o3"]);
        let order = OutcomeCoverageFirst::new(["o1".to_string()].into_iter().collect());
        let mut list = vec![&a1, &a2, &a3, &a4];
        sort_candidates(&mut list, &order);
        let ids: Vec<i64> = list.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
    }

    #[test]
    fn id_order_ignores_outcomes() {
        let a1 = activity(5, &[]);
        let a2 = activity(2, &["o9"]);
        let mut list = vec![&a1, &a2];
        sort_candidates(&mut list, &ByActivityId);
        assert_eq!(list[0].id, 2);
    }

    #[test]
    fn kind_parses_and_builds() {
        assert_eq!(PriorityKind::parse("Coverage"), Some(PriorityKind::Coverage));
        assert_eq!(PriorityKind::parse("id"), Some(PriorityKind::Id));
        assert_eq!(PriorityKind::parse("random"), None);
        assert_eq!(PriorityKind::Id.build(HashSet::new()).name(), "id");
    }
}
