//! Task queries: filters, ordering and section grouping.
//!
//! A query is a list of task-column filters plus keyword filters, an
//! ordering, and an optional per-section limit. Listings group tasks into
//! sections by project name or, when a grouping pattern is given, by
//! keyword name; within a section the ordering applies.

use std::collections::BTreeMap;

use crate::dates::DateLimit;
use crate::db::model::{keyword_is_reserved, TaskRecord, TaskStatus};
use crate::db::store::TaskStore;
use crate::error::{Error, Result};

// =============================================================================
// Filters
// =============================================================================

/// A predicate over task columns.
#[derive(Debug, Clone)]
pub enum TaskFilter {
    /// Status is one of the given set.
    Status(Vec<TaskStatus>),
    /// Due date present and within the limit.
    Due(DateLimit),
    /// Done date present and within the limit.
    Done(DateLimit),
    /// Case-insensitive substring over title and description.
    Search(String),
}

impl TaskFilter {
    fn matches(&self, task: &TaskRecord) -> bool {
        match self {
            TaskFilter::Status(statuses) => statuses.contains(&task.status),
            TaskFilter::Due(limit) => task
                .due_date
                .is_some_and(|date| limit.op.matches(date, limit.date)),
            TaskFilter::Done(limit) => task
                .done_date
                .is_some_and(|date| limit.op.matches(date, limit.date)),
            TaskFilter::Search(needle) => {
                let needle = needle.to_lowercase();
                task.title.to_lowercase().contains(&needle)
                    || task.description.to_lowercase().contains(&needle)
            }
        }
    }
}

/// Comparison applied to a keyword value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOp {
    Eq,
    Ne,
}

/// Matches tasks by keyword name pattern and optional value.
///
/// `pattern` supports `%` as a wildcard, matching is case-insensitive. A
/// negative filter excludes any task with at least one matching keyword.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    pattern: String,
    negative: bool,
    value: Option<i64>,
    value_op: ValueOp,
}

impl KeywordFilter {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(Error::UserInput(
                "keyword filter pattern cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            pattern,
            negative: false,
            value: None,
            value_op: ValueOp::Eq,
        })
    }

    pub fn negative(mut self) -> Self {
        self.negative = true;
        self
    }

    pub fn with_value(mut self, value: i64, op: ValueOp) -> Self {
        self.value = Some(value);
        self.value_op = op;
        self
    }

    fn matches(&self, task: &TaskRecord) -> bool {
        let hit = task.keywords.iter().any(|(name, value)| {
            if !like_match(&self.pattern, name) {
                return false;
            }
            match self.value {
                None => true,
                Some(wanted) => {
                    let equal = *value == Some(wanted);
                    match self.value_op {
                        ValueOp::Eq => equal,
                        ValueOp::Ne => !equal,
                    }
                }
            }
        });
        hit != self.negative
    }
}

/// SQL-LIKE match with `%` as the only wildcard, case-insensitive.
fn like_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    if !pattern.contains('%') {
        return pattern == text;
    }
    let parts: Vec<&str> = pattern.split('%').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(offset) => pos = pos + offset + part.len(),
            None => return false,
        }
    }
    if last.is_empty() {
        return true;
    }
    text.len() >= pos + last.len() && text.ends_with(last)
}

// =============================================================================
// Ordering and grouping
// =============================================================================

/// Ordering of tasks within a section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskOrder {
    /// Descending urgency, earlier creation date breaking ties.
    #[default]
    Urgency,
    /// Ascending due date, undated tasks last.
    Due,
}

impl TaskOrder {
    // Session id breaks creation-date ties; uuid order would reshuffle
    // tasks created within the same second.
    fn sort(self, store: &TaskStore, tasks: &mut [TaskRecord]) {
        match self {
            TaskOrder::Urgency => tasks.sort_by(|a, b| {
                b.urgency
                    .cmp(&a.urgency)
                    .then_with(|| a.creation_date.cmp(&b.creation_date))
                    .then_with(|| store.task_id(a.uuid).cmp(&store.task_id(b.uuid)))
            }),
            TaskOrder::Due => tasks.sort_by(|a, b| {
                let a_due = a.due_date.map_or((1, None), |d| (0, Some(d)));
                let b_due = b.due_date.map_or((1, None), |d| (0, Some(d)));
                a_due
                    .cmp(&b_due)
                    .then_with(|| a.creation_date.cmp(&b.creation_date))
                    .then_with(|| store.task_id(a.uuid).cmp(&store.task_id(b.uuid)))
            }),
        }
    }
}

/// How listings are cut into sections.
#[derive(Debug, Clone)]
pub enum Grouping {
    /// One section per project, ordered by lower-case project name.
    Project,
    /// One section per keyword matching the pattern, ordered by lower-case
    /// keyword name. Reserved keywords are skipped unless named exactly.
    Keyword(String),
}

/// A group of tasks under one heading.
#[derive(Debug, Clone)]
pub struct Section {
    pub label: String,
    pub tasks: Vec<TaskRecord>,
}

// =============================================================================
// Query
// =============================================================================

/// A composed task query.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    filters: Vec<TaskFilter>,
    keyword_filters: Vec<KeywordFilter>,
    order: TaskOrder,
    limit: Option<usize>,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: TaskFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn keyword_filter(mut self, filter: KeywordFilter) -> Self {
        self.keyword_filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: TaskOrder) -> Self {
        self.order = order;
        self
    }

    /// Truncate each section to at most `limit` tasks.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, task: &TaskRecord) -> bool {
        self.filters.iter().all(|filter| filter.matches(task))
            && self
                .keyword_filters
                .iter()
                .all(|filter| filter.matches(task))
    }

    /// Run the query as a flat list, ordered and truncated.
    pub fn run(&self, store: &TaskStore) -> Vec<TaskRecord> {
        let mut tasks: Vec<TaskRecord> = store
            .tasks()
            .filter(|task| self.matches(task))
            .cloned()
            .collect();
        self.order.sort(store, &mut tasks);
        if let Some(limit) = self.limit {
            tasks.truncate(limit);
        }
        tasks
    }

    /// Run the query grouped into sections.
    pub fn sections(&self, store: &TaskStore, grouping: &Grouping) -> Vec<Section> {
        let matching: Vec<TaskRecord> = store
            .tasks()
            .filter(|task| self.matches(task))
            .cloned()
            .collect();

        // BTreeMap on the lower-case label keeps section order stable.
        let mut groups: BTreeMap<String, Section> = BTreeMap::new();
        match grouping {
            Grouping::Project => {
                for task in matching {
                    let Ok(project) = store.project_by_uuid(task.project_uuid) else {
                        continue;
                    };
                    groups
                        .entry(project.name.to_lowercase())
                        .or_insert_with(|| Section {
                            label: project.name.clone(),
                            tasks: Vec::new(),
                        })
                        .tasks
                        .push(task);
                }
            }
            Grouping::Keyword(pattern) => {
                for task in matching {
                    for name in task.keywords.keys() {
                        if !like_match(pattern, name) {
                            continue;
                        }
                        if keyword_is_reserved(name) && name != pattern {
                            continue;
                        }
                        groups
                            .entry(name.to_lowercase())
                            .or_insert_with(|| Section {
                                label: name.clone(),
                                tasks: Vec::new(),
                            })
                            .tasks
                            .push(task.clone());
                    }
                }
            }
        }

        let mut sections: Vec<Section> = groups.into_values().collect();
        for section in &mut sections {
            self.order.sort(store, &mut section.tasks);
            if let Some(limit) = self.limit {
                section.tasks.truncate(limit);
            }
        }
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::CompOp;
    use crate::ui::AcceptAll;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn keyword_map(entries: &[(&str, Option<i64>)]) -> BTreeMap<String, Option<i64>> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    fn sample_store() -> TaskStore {
        let mut store = TaskStore::in_memory();
        let t1 = store
            .add_task("alpha", "fix roof", &keyword_map(&[("home", None)]), &mut AcceptAll)
            .unwrap();
        let t2 = store
            .add_task(
                "alpha",
                "buy paint",
                &keyword_map(&[("home", None), ("errand", Some(2))]),
                &mut AcceptAll,
            )
            .unwrap();
        let t3 = store
            .add_task("Beta", "write report", &keyword_map(&[("work", None)]), &mut AcceptAll)
            .unwrap();
        store.set_urgency(t1.uuid, 10).unwrap();
        store.set_urgency(t2.uuid, 50).unwrap();
        store.set_status(t3.uuid, TaskStatus::Done).unwrap();
        store
    }

    #[test]
    fn like_match_wildcards() {
        assert!(like_match("home", "Home"));
        assert!(like_match("ho%", "home"));
        assert!(like_match("%me", "home"));
        assert!(like_match("%om%", "home"));
        assert!(like_match("%", "anything"));
        assert!(!like_match("ho%", "work"));
        assert!(!like_match("home", "homework"));
    }

    #[test]
    fn empty_keyword_pattern_is_rejected() {
        assert!(KeywordFilter::new("").is_err());
    }

    #[test]
    fn status_filter() {
        let store = sample_store();
        let open = TaskQuery::new()
            .filter(TaskFilter::Status(vec![TaskStatus::New, TaskStatus::Started]))
            .run(&store);
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|task| task.status != TaskStatus::Done));
    }

    #[test]
    fn urgency_order_with_creation_tiebreak() {
        let store = sample_store();
        let tasks = TaskQuery::new().run(&store);
        assert_eq!(tasks[0].title, "buy paint");
        assert_eq!(tasks[1].title, "fix roof");
        // Equal urgency falls back to creation order.
        assert_eq!(tasks[2].title, "write report");
    }

    #[test]
    fn due_order_puts_undated_last() {
        let mut store = sample_store();
        let near = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let far = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let uuid_far = store.get_task("1").unwrap().uuid;
        let uuid_near = store.get_task("2").unwrap().uuid;
        store.set_due_date(uuid_far, Some(far)).unwrap();
        store.set_due_date(uuid_near, Some(near)).unwrap();

        let tasks = TaskQuery::new().order_by(TaskOrder::Due).run(&store);
        assert_eq!(tasks[0].uuid, uuid_near);
        assert_eq!(tasks[1].uuid, uuid_far);
        assert!(tasks[2].due_date.is_none());

        let due_before_april = TaskQuery::new()
            .filter(TaskFilter::Due(DateLimit {
                op: CompOp::Lt,
                date: NaiveDate::from_ymd_opt(2024, 4, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            }))
            .run(&store);
        assert_eq!(due_before_april.len(), 1);
        assert_eq!(due_before_april[0].uuid, uuid_near);
    }

    #[test]
    fn keyword_filters_positive_negative_and_valued() {
        let store = sample_store();

        let home = TaskQuery::new()
            .keyword_filter(KeywordFilter::new("home").unwrap())
            .run(&store);
        assert_eq!(home.len(), 2);

        let not_home = TaskQuery::new()
            .keyword_filter(KeywordFilter::new("home").unwrap().negative())
            .run(&store);
        assert_eq!(not_home.len(), 1);
        assert_eq!(not_home[0].title, "write report");

        let errand_2 = TaskQuery::new()
            .keyword_filter(
                KeywordFilter::new("errand")
                    .unwrap()
                    .with_value(2, ValueOp::Eq),
            )
            .run(&store);
        assert_eq!(errand_2.len(), 1);
        assert_eq!(errand_2[0].title, "buy paint");

        let errand_not_3 = TaskQuery::new()
            .keyword_filter(
                KeywordFilter::new("errand")
                    .unwrap()
                    .with_value(3, ValueOp::Ne),
            )
            .run(&store);
        assert_eq!(errand_not_3.len(), 1);
    }

    #[test]
    fn search_filter_is_case_insensitive() {
        let store = sample_store();
        let hits = TaskQuery::new()
            .filter(TaskFilter::Search("PAINT".to_string()))
            .run(&store);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "buy paint");
    }

    #[test]
    fn project_sections_sort_case_insensitively() {
        let store = sample_store();
        let sections = TaskQuery::new().sections(&store, &Grouping::Project);
        let labels: Vec<&str> = sections.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["alpha", "Beta"]);
        assert_eq!(sections[0].tasks.len(), 2);
        assert_eq!(sections[0].tasks[0].title, "buy paint");
    }

    #[test]
    fn keyword_sections_with_limit() {
        let store = sample_store();
        let sections = TaskQuery::new()
            .limit(1)
            .sections(&store, &Grouping::Keyword("%".to_string()));
        let labels: Vec<&str> = sections.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["errand", "home", "work"]);
        assert!(sections.iter().all(|section| section.tasks.len() == 1));
        // The limit keeps the most urgent task of each section.
        assert_eq!(sections[1].tasks[0].title, "buy paint");
    }
}
