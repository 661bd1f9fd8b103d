//! Corpus loading and indexing.
//!
//! A corpus is a set of JSON files of the shape `{"questions": [...]}`.
//! Flat records become [`Item`]s; records with a nested `questions` array
//! become atomic [`Group`]s. Loading is all-or-nothing: the first unreadable
//! file or bad record aborts the load.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::CorpusError;
use crate::model::{Difficulty, Footprint, Group, Item, Payload};

/// Keys interpreted by the engine on item records.
const ITEM_KEYS: [&str; 4] = ["question_id", "topic", "subtopic", "difficulty"];
/// Keys the engine assigns on output; stale copies in the corpus are dropped.
const ENGINE_KEYS: [&str; 2] = ["position", "group_id"];
/// Keys interpreted by the engine on group records.
const GROUP_KEYS: [&str; 5] = ["di_set_id", "group_id", "topic", "questions", "difficulty_footprint"];

/// Whether a corpus file holds flat items or groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Items,
    Groups,
}

/// Per-file statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStats {
    pub file: String,
    pub kind: FileKind,
    pub total_questions: usize,
    /// Zero for item files.
    pub total_groups: usize,
    pub by_topic: BTreeMap<String, usize>,
    pub by_difficulty: BTreeMap<Difficulty, usize>,
    /// `"E-M-H"` -> number of groups. Empty for item files.
    pub by_footprint: BTreeMap<String, usize>,
}

/// Result of an availability check for one (topic, difficulty) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub sufficient: bool,
    pub available: usize,
    pub missing: usize,
}

/// In-memory, read-only index over loaded corpus files.
#[derive(Debug, Default)]
pub struct CorpusIndex {
    group_size: usize,
    items: Vec<Item>,
    groups: Vec<Group>,
    files: BTreeMap<String, FileKind>,
    by_topic: BTreeMap<String, Vec<usize>>,
    by_difficulty: BTreeMap<Difficulty, Vec<usize>>,
    by_topic_difficulty: BTreeMap<String, BTreeMap<Difficulty, Vec<usize>>>,
    groups_by_footprint: BTreeMap<Footprint, Vec<usize>>,
    /// id -> file, shared by items and group members.
    item_ids: HashMap<String, String>,
    group_ids: HashMap<String, String>,
}

impl CorpusIndex {
    /// Empty index for groups of `group_size` members.
    pub fn new(group_size: u32) -> Self {
        Self {
            group_size: group_size as usize,
            ..Self::default()
        }
    }

    /// Load `files` (names relative to `dir`) into a fresh index.
    pub fn load(dir: &Path, files: &[String], group_size: u32) -> Result<Self, CorpusError> {
        let mut index = Self::new(group_size);
        for file in files {
            index.load_file(dir, file)?;
        }
        info!(
            files = index.files.len(),
            items = index.items.len(),
            groups = index.groups.len(),
            "corpus loaded"
        );
        Ok(index)
    }

    /// Load one file. A file already loaded is skipped.
    pub fn load_file(&mut self, dir: &Path, file: &str) -> Result<(), CorpusError> {
        if self.files.contains_key(file) {
            return Ok(());
        }
        let path = dir.join(file);
        let content = std::fs::read_to_string(&path).map_err(|source| CorpusError::Read {
            path: path.clone(),
            source,
        })?;
        let doc: Value = serde_json::from_str(&content).map_err(|source| CorpusError::Parse {
            path: path.clone(),
            source,
        })?;
        self.add_document(file, &doc)
            .map_err(|e| with_path(e, &path))
    }

    /// Index an already-parsed document under the name `file`.
    pub fn add_document(&mut self, file: &str, doc: &Value) -> Result<(), CorpusError> {
        let path = Path::new(file).to_path_buf();
        let records = doc
            .get("questions")
            .and_then(Value::as_array)
            .ok_or_else(|| CorpusError::MissingQuestions { path: path.clone() })?;

        // Parse everything first so a bad record leaves the index untouched.
        let mut items = Vec::new();
        let mut groups = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            let obj = record.as_object().ok_or_else(|| CorpusError::Record {
                path: path.clone(),
                index: idx,
                message: "record is not an object".into(),
            })?;
            if obj.get("questions").is_some_and(Value::is_array) {
                groups.push(self.parse_group(obj, file, idx)?);
            } else {
                items.push(parse_item(obj, file, None).map_err(|message| CorpusError::Record {
                    path: path.clone(),
                    index: idx,
                    message,
                })?);
            }
        }

        self.check_duplicates(file, &items, &groups)?;

        let kind = if groups.is_empty() {
            FileKind::Items
        } else {
            FileKind::Groups
        };
        debug!(file, items = items.len(), groups = groups.len(), "indexed corpus file");

        for item in items {
            self.insert_item(item);
        }
        for group in groups {
            self.insert_group(group);
        }
        self.files.insert(file.to_string(), kind);
        Ok(())
    }

    fn parse_group(
        &self,
        obj: &Map<String, Value>,
        file: &str,
        index: usize,
    ) -> Result<Group, CorpusError> {
        let record_err = |message: String| CorpusError::Record {
            path: Path::new(file).to_path_buf(),
            index,
            message,
        };

        let group_id = obj
            .get("di_set_id")
            .or_else(|| obj.get("group_id"))
            .and_then(id_string)
            .ok_or_else(|| record_err("group has no di_set_id or group_id".into()))?;
        let topic = non_empty_str(obj, "topic").unwrap_or("Unknown").to_string();

        let raw_members = obj
            .get("questions")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if raw_members.len() != self.group_size {
            return Err(CorpusError::GroupSize {
                path: Path::new(file).to_path_buf(),
                group_id,
                expected: self.group_size,
                actual: raw_members.len(),
            });
        }

        let mut members = Vec::with_capacity(raw_members.len());
        for (pos, member) in raw_members.iter().enumerate() {
            let member = member.as_object().ok_or_else(|| {
                record_err(format!("group '{group_id}' member {} is not an object", pos + 1))
            })?;
            let item = parse_item(member, file, Some(&topic))
                .map_err(|m| record_err(format!("group '{group_id}' member {}: {m}", pos + 1)))?;
            members.push(item);
        }
        members.sort_by(|a, b| a.id.cmp(&b.id));

        let context: Payload = obj
            .iter()
            .filter(|(k, _)| !GROUP_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Group {
            footprint: Footprint::of(&members),
            group_id,
            topic,
            members,
            source: file.to_string(),
            context,
        })
    }

    fn check_duplicates(
        &self,
        file: &str,
        items: &[Item],
        groups: &[Group],
    ) -> Result<(), CorpusError> {
        let mut seen_items: HashMap<&str, &str> = HashMap::new();
        let mut seen_groups: HashMap<&str, &str> = HashMap::new();
        let dup = |id: &str, first_seen: &str| CorpusError::DuplicateId {
            path: Path::new(file).to_path_buf(),
            id: id.to_string(),
            first_seen: first_seen.to_string(),
        };

        let member_ids = groups.iter().flat_map(|g| g.members.iter());
        for item in items.iter().chain(member_ids) {
            if let Some(first) = self.item_ids.get(&item.id) {
                return Err(dup(&item.id, first));
            }
            if seen_items.insert(&item.id, file).is_some() {
                return Err(dup(&item.id, file));
            }
        }
        for group in groups {
            if let Some(first) = self.group_ids.get(&group.group_id) {
                return Err(dup(&group.group_id, first));
            }
            if seen_groups.insert(&group.group_id, file).is_some() {
                return Err(dup(&group.group_id, file));
            }
        }
        Ok(())
    }

    fn insert_item(&mut self, item: Item) {
        let idx = self.items.len();
        self.item_ids.insert(item.id.clone(), item.source.clone());
        self.by_topic.entry(item.topic.clone()).or_default().push(idx);
        self.by_difficulty.entry(item.difficulty).or_default().push(idx);
        self.by_topic_difficulty
            .entry(item.topic.clone())
            .or_default()
            .entry(item.difficulty)
            .or_default()
            .push(idx);
        self.items.push(item);
    }

    fn insert_group(&mut self, group: Group) {
        let idx = self.groups.len();
        for member in &group.members {
            self.item_ids.insert(member.id.clone(), group.source.clone());
        }
        self.group_ids
            .insert(group.group_id.clone(), group.source.clone());
        self.groups_by_footprint
            .entry(group.footprint)
            .or_default()
            .push(idx);
        self.groups.push(group);
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Configured group size K.
    pub fn group_size(&self) -> u32 {
        self.group_size as u32
    }

    /// All ungrouped items.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// All groups.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Loaded file names with their kind.
    pub fn files(&self) -> &BTreeMap<String, FileKind> {
        &self.files
    }

    /// Topics of ungrouped items.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.by_topic.keys().map(String::as_str)
    }

    pub fn by_topic(&self, topic: &str) -> Vec<&Item> {
        self.resolve(self.by_topic.get(topic))
    }

    pub fn by_difficulty(&self, difficulty: Difficulty) -> Vec<&Item> {
        self.resolve(self.by_difficulty.get(&difficulty))
    }

    /// Ungrouped items of one topic and difficulty.
    pub fn by_topic_difficulty(&self, topic: &str, difficulty: Difficulty) -> Vec<&Item> {
        self.resolve(
            self.by_topic_difficulty
                .get(topic)
                .and_then(|m| m.get(&difficulty)),
        )
    }

    /// Groups with exactly this footprint.
    pub fn groups_with_footprint(&self, footprint: &Footprint) -> Vec<&Group> {
        self.groups_by_footprint
            .get(footprint)
            .map(|ids| ids.iter().map(|&i| &self.groups[i]).collect())
            .unwrap_or_default()
    }

    /// Groups bucketed by footprint distance from `target`, nearest bucket
    /// first. Built from the footprint index, one distance per footprint.
    pub fn groups_by_distance(&self, target: &Footprint) -> Vec<(u32, Vec<&Group>)> {
        let mut buckets: BTreeMap<u32, Vec<&Group>> = BTreeMap::new();
        for (fp, ids) in &self.groups_by_footprint {
            buckets
                .entry(fp.distance(target))
                .or_default()
                .extend(ids.iter().map(|&i| &self.groups[i]));
        }
        buckets.into_iter().collect()
    }

    /// Distinct group footprints present, with their group counts.
    pub fn footprints(&self) -> BTreeMap<Footprint, usize> {
        self.groups_by_footprint
            .iter()
            .map(|(fp, ids)| (*fp, ids.len()))
            .collect()
    }

    pub fn group(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }

    fn resolve(&self, ids: Option<&Vec<usize>>) -> Vec<&Item> {
        ids.map(|ids| ids.iter().map(|&i| &self.items[i]).collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Statistics for one loaded file, or `None` if it was not loaded.
    pub fn stats(&self, file: &str) -> Option<FileStats> {
        let kind = *self.files.get(file)?;
        let mut stats = FileStats {
            file: file.to_string(),
            kind,
            total_questions: 0,
            total_groups: 0,
            by_topic: BTreeMap::new(),
            by_difficulty: BTreeMap::new(),
            by_footprint: BTreeMap::new(),
        };

        for item in self.items.iter().filter(|i| i.source == file) {
            stats.total_questions += 1;
            *stats.by_topic.entry(item.topic.clone()).or_default() += 1;
            *stats.by_difficulty.entry(item.difficulty).or_default() += 1;
        }
        for group in self.groups.iter().filter(|g| g.source == file) {
            stats.total_groups += 1;
            stats.total_questions += group.len();
            *stats.by_topic.entry(group.topic.clone()).or_default() += 1;
            *stats
                .by_footprint
                .entry(group.footprint.to_string())
                .or_default() += 1;
            for member in &group.members {
                *stats.by_difficulty.entry(member.difficulty).or_default() += 1;
            }
        }
        Some(stats)
    }

    /// Whether at least `required` ungrouped items exist for the cell.
    pub fn availability(&self, topic: &str, difficulty: Difficulty, required: usize) -> Availability {
        let available = self.by_topic_difficulty(topic, difficulty).len();
        Availability {
            sufficient: available >= required,
            available,
            missing: required.saturating_sub(available),
        }
    }
}

fn with_path(err: CorpusError, path: &Path) -> CorpusError {
    match err {
        CorpusError::MissingQuestions { .. } => CorpusError::MissingQuestions {
            path: path.to_path_buf(),
        },
        CorpusError::Record { index, message, .. } => CorpusError::Record {
            path: path.to_path_buf(),
            index,
            message,
        },
        CorpusError::GroupSize {
            group_id,
            expected,
            actual,
            ..
        } => CorpusError::GroupSize {
            path: path.to_path_buf(),
            group_id,
            expected,
            actual,
        },
        CorpusError::DuplicateId { id, first_seen, .. } => CorpusError::DuplicateId {
            path: path.to_path_buf(),
            id,
            first_seen,
        },
        other => other,
    }
}

/// Parse one flat record. `group_topic` is the fallback topic for members.
fn parse_item(
    obj: &Map<String, Value>,
    file: &str,
    group_topic: Option<&str>,
) -> Result<Item, String> {
    let id = obj
        .get("question_id")
        .and_then(id_string)
        .ok_or("missing question_id")?;

    let topic = non_empty_str(obj, "topic")
        .or_else(|| non_empty_str(obj, "reasoning_topic"))
        .or_else(|| non_empty_str(obj, "sub_topic"))
        .or(group_topic)
        .unwrap_or("Unknown")
        .to_string();

    let difficulty = match obj.get("difficulty") {
        None | Some(Value::Null) => Difficulty::Medium,
        Some(Value::String(s)) => s
            .parse()
            .map_err(|e| format!("question '{id}': {e}"))?,
        Some(other) => return Err(format!("question '{id}': invalid difficulty {other}")),
    };

    let payload: Payload = obj
        .iter()
        .filter(|(k, _)| !ITEM_KEYS.contains(&k.as_str()) && !ENGINE_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(Item {
        id,
        topic,
        subtopic: non_empty_str(obj, "subtopic").map(str::to_string),
        difficulty,
        source: file.to_string(),
        payload,
    })
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn banking_doc() -> Value {
        json!({"questions": [
            {"question_id": "GA_001", "topic": "Banking", "difficulty": "Easy", "question": "q1"},
            {"question_id": "GA_002", "topic": "Banking", "difficulty": "medium "},
            {"question_id": "GA_003", "topic": "Economy", "difficulty": "Hard"},
            {"question_id": "GA_004", "reasoning_topic": "Puzzles"},
            {"question_id": "GA_005", "position": 7, "group_id": "stale"}
        ]})
    }

    fn di_set(id: &str, diffs: [&str; 5]) -> Value {
        let questions: Vec<Value> = diffs
            .iter()
            .enumerate()
            .map(|(i, d)| json!({"question_id": format!("{id}_Q{}", 5 - i), "difficulty": d}))
            .collect();
        json!({"di_set_id": id, "topic": "Bar Chart", "data": {"x": [1, 2]}, "questions": questions})
    }

    #[test]
    fn indexes_items_by_topic_and_difficulty() {
        let mut index = CorpusIndex::new(5);
        index.add_document("ga.json", &banking_doc()).unwrap();

        assert_eq!(index.items().len(), 5);
        assert_eq!(index.by_topic("Banking").len(), 2);
        assert_eq!(index.by_topic_difficulty("Banking", Difficulty::Medium).len(), 1);
        assert_eq!(index.by_topic_difficulty("Puzzles", Difficulty::Medium).len(), 1);
        assert_eq!(index.by_topic("Unknown").len(), 1);
        assert_eq!(index.by_difficulty(Difficulty::Medium).len(), 3);
        assert_eq!(index.files()["ga.json"], FileKind::Items);
    }

    #[test]
    fn strips_engine_assigned_keys_and_keeps_payload() {
        let mut index = CorpusIndex::new(5);
        index.add_document("ga.json", &banking_doc()).unwrap();
        let first = &index.by_topic_difficulty("Banking", Difficulty::Easy)[0];
        assert_eq!(first.payload["question"], "q1");
        assert_eq!(first.source, "ga.json");
        let stale = index.items().iter().find(|i| i.id == "GA_005").unwrap();
        assert!(stale.payload.is_empty());
    }

    #[test]
    fn builds_groups_with_sorted_members_and_footprint() {
        let mut index = CorpusIndex::new(5);
        let doc = json!({"questions": [
            di_set("DI_001", ["Easy", "Medium", "Medium", "Medium", "Hard"]),
            di_set("DI_002", ["Easy", "Easy", "Medium", "Medium", "Hard"]),
        ]});
        index.add_document("di_master.json", &doc).unwrap();

        assert_eq!(index.groups().len(), 2);
        let g = index.group("DI_001").unwrap();
        assert_eq!(g.footprint.to_string(), "1-3-1");
        assert_eq!(g.members[0].id, "DI_001_Q1");
        assert_eq!(g.members[0].topic, "Bar Chart");
        assert!(g.context.contains_key("data"));
        assert_eq!(index.groups_with_footprint(&"2-2-1".parse().unwrap()).len(), 1);
        assert!(index.items().is_empty());
    }

    #[test]
    fn groups_are_bucketed_by_footprint_distance() {
        let mut index = CorpusIndex::new(5);
        let doc = json!({"questions": [
            di_set("DI_001", ["Easy", "Medium", "Medium", "Medium", "Hard"]),
            di_set("DI_002", ["Easy", "Easy", "Medium", "Medium", "Hard"]),
            di_set("DI_003", ["Easy", "Medium", "Medium", "Medium", "Hard"]),
            di_set("DI_004", ["Hard", "Hard", "Hard", "Hard", "Hard"]),
        ]});
        index.add_document("di_master.json", &doc).unwrap();

        let buckets = index.groups_by_distance(&"1-3-1".parse().unwrap());
        let shape: Vec<(u32, Vec<&str>)> = buckets
            .iter()
            .map(|(d, groups)| (*d, groups.iter().map(|g| g.group_id.as_str()).collect()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (0, vec!["DI_001", "DI_003"]),
                (2, vec!["DI_002"]),
                (8, vec!["DI_004"]),
            ]
        );
    }

    #[test]
    fn wrong_group_size_is_an_error() {
        let mut index = CorpusIndex::new(4);
        let doc = json!({"questions": [di_set("DI_001", ["Easy", "Medium", "Medium", "Medium", "Hard"])]});
        let err = index.add_document("di.json", &doc).unwrap_err();
        assert!(matches!(err, CorpusError::GroupSize { actual: 5, expected: 4, .. }));
    }

    #[test]
    fn invalid_difficulty_is_an_error() {
        let mut index = CorpusIndex::new(5);
        let doc = json!({"questions": [{"question_id": "X1", "topic": "T", "difficulty": "Brutal"}]});
        let err = index.add_document("x.json", &doc).unwrap_err();
        assert!(err.to_string().contains("record 0"));
        assert!(index.items().is_empty());
    }

    #[test]
    fn duplicate_ids_across_files_are_rejected() {
        let mut index = CorpusIndex::new(5);
        index.add_document("a.json", &banking_doc()).unwrap();
        let doc = json!({"questions": [{"question_id": "GA_001", "topic": "Banking"}]});
        match index.add_document("b.json", &doc).unwrap_err() {
            CorpusError::DuplicateId { id, first_seen, .. } => {
                assert_eq!(id, "GA_001");
                assert_eq!(first_seen, "a.json");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_questions_array_is_an_error() {
        let mut index = CorpusIndex::new(5);
        let err = index.add_document("x.json", &json!({"items": []})).unwrap_err();
        assert!(matches!(err, CorpusError::MissingQuestions { .. }));
    }

    #[test]
    fn load_fails_fast_on_missing_or_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ga.json"), banking_doc().to_string()).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{\"questions\": [").unwrap();

        let ok = CorpusIndex::load(dir.path(), &["ga.json".into()], 5).unwrap();
        assert_eq!(ok.items().len(), 5);

        let err = CorpusIndex::load(dir.path(), &["ga.json".into(), "broken.json".into()], 5)
            .unwrap_err();
        assert!(matches!(err, CorpusError::Parse { .. }));

        let err = CorpusIndex::load(dir.path(), &["nope.json".into()], 5).unwrap_err();
        assert!(matches!(err, CorpusError::Read { .. }));
    }

    #[test]
    fn record_errors_carry_full_path() {
        let dir = tempfile::tempdir().unwrap();
        let doc = json!({"questions": [{"topic": "T"}]});
        std::fs::write(dir.path().join("bad.json"), doc.to_string()).unwrap();
        let err = CorpusIndex::load(dir.path(), &["bad.json".into()], 5).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(&dir.path().join("bad.json").display().to_string()));
        assert!(msg.contains("missing question_id"));
    }

    #[test]
    fn stats_and_availability() {
        let mut index = CorpusIndex::new(5);
        index.add_document("ga.json", &banking_doc()).unwrap();
        index
            .add_document(
                "di.json",
                &json!({"questions": [di_set("DI_001", ["Easy", "Medium", "Medium", "Medium", "Hard"])]}),
            )
            .unwrap();

        let ga = index.stats("ga.json").unwrap();
        assert_eq!(ga.total_questions, 5);
        assert_eq!(ga.by_topic["Banking"], 2);
        assert_eq!(ga.by_difficulty[&Difficulty::Medium], 3);

        let di = index.stats("di.json").unwrap();
        assert_eq!(di.kind, FileKind::Groups);
        assert_eq!(di.total_groups, 1);
        assert_eq!(di.total_questions, 5);
        assert_eq!(di.by_footprint["1-3-1"], 1);

        assert!(index.stats("other.json").is_none());

        let a = index.availability("Banking", Difficulty::Easy, 3);
        assert_eq!(a, Availability { sufficient: false, available: 1, missing: 2 });
    }
}
