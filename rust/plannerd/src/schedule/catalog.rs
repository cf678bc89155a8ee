use super::error::ModelError;
use super::model::{Activity, ActivityId};
use std::collections::HashSet;

/// Activities available to the scheduler, in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct ActivityCatalog {
    activities: Vec<Activity>,
}

pub fn validate_activity(activity: &Activity) -> Result<(), ModelError> {
    match activity.duration_mins {
        Some(d) if d <= 0 => Err(ModelError::NonPositiveDuration {
            activity_id: activity.id,
            duration_mins: d,
        }),
        _ => Ok(()),
    }
}

impl ActivityCatalog {
    pub fn new<I>(activities: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = Activity>,
    {
        let mut seen: HashSet<ActivityId> = HashSet::new();
        let mut out: Vec<Activity> = Vec::new();
        for activity in activities {
            validate_activity(&activity)?;
            if !seen.insert(activity.id) {
                return Err(ModelError::DuplicateActivity(activity.id));
            }
            out.push(activity);
        }
        out.sort_by_key(|a| a.id);
        Ok(Self { activities: out })
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.activities
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|idx| &self.activities[idx])
    }

    #[cfg(test)]
    pub fn activities_for_subject<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> impl Iterator<Item = &'a Activity> + 'a {
        self.activities
            .iter()
            .filter(move |a| a.subject_id.as_deref() == Some(subject_id))
    }

    /// Keeps only the listed activities. Unknown ids are ignored.
    pub fn retain_ids(&mut self, ids: &HashSet<ActivityId>) {
        self.activities.retain(|a| ids.contains(&a.id));
    }

    pub fn exclude_ids(&mut self, ids: &HashSet<ActivityId>) {
        self.activities.retain(|a| !ids.contains(&a.id));
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}
