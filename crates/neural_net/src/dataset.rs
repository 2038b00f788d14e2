//! Feature/label splitting
//!
//! Turns a string [`Table`] into a numeric training set. Malformed rows are
//! dropped and counted (or rejected in strict mode), labels are encoded
//! either as continuous targets or as class indices, and features are
//! optionally standardized.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{Result, TrainerError};
use crate::table::Table;

/// Which column holds the label
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelColumn {
    #[default]
    Last,
    Name(String),
    Index(usize),
}

/// What to do with a row that cannot be used
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedRowPolicy {
    /// Skip the row and count it
    #[default]
    Drop,
    /// Fail the whole split on the first malformed row
    Reject,
}

/// Requested learning task; `Auto` infers it from the label values
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Auto,
    Regression,
    Classification,
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(TaskKind::Auto),
            "regression" => Ok(TaskKind::Regression),
            "classification" => Ok(TaskKind::Classification),
            other => Err(format!("unknown task '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub label: LabelColumn,
    pub policy: MalformedRowPolicy,
    pub task: TaskKind,
    /// Standardize every feature to zero mean / unit variance
    pub standardize: bool,
    /// Largest class count inferred from integral numeric labels
    pub max_classes: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            label: LabelColumn::Last,
            policy: MalformedRowPolicy::Drop,
            task: TaskKind::Auto,
            standardize: true,
            max_classes: 32,
        }
    }
}

/// Learning task resolved from the data
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Regression,
    Classification { classes: usize },
}

impl Task {
    pub fn is_classification(&self) -> bool {
        matches!(self, Task::Classification { .. })
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::Regression => write!(f, "regression"),
            Task::Classification { classes } => write!(f, "classification ({} classes)", classes),
        }
    }
}

/// Distinct label strings mapped to class indices in first-seen order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelVocabulary {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `label`, assigning the next free one on first sight
    pub fn intern(&mut self, label: &str) -> usize {
        if let Some(&idx) = self.index.get(label) {
            return idx;
        }
        let idx = self.labels.len();
        self.labels.push(label.to_string());
        self.index.insert(label.to_string(), idx);
        idx
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn label_of(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl From<Vec<String>> for LabelVocabulary {
    fn from(labels: Vec<String>) -> Self {
        let mut vocab = Self::new();
        for label in &labels {
            vocab.intern(label);
        }
        vocab
    }
}

impl From<LabelVocabulary> for Vec<String> {
    fn from(vocab: LabelVocabulary) -> Self {
        vocab.labels
    }
}

/// How raw label cells map onto the numeric target vector
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelEncoding {
    /// Label value is the regression target
    Continuous,
    /// Non-negative integral labels used directly as class indices
    ClassIndex { classes: usize },
    /// String labels interned into a vocabulary
    Vocabulary(LabelVocabulary),
}

impl LabelEncoding {
    pub fn task(&self) -> Task {
        match self {
            LabelEncoding::Continuous => Task::Regression,
            LabelEncoding::ClassIndex { classes } => Task::Classification { classes: *classes },
            LabelEncoding::Vocabulary(vocab) => Task::Classification {
                classes: vocab.len(),
            },
        }
    }

    /// Numeric target for a raw label cell, using the existing mapping only
    pub fn encode(&self, raw: &str) -> Option<f64> {
        match self {
            LabelEncoding::Continuous => parse_finite(raw),
            LabelEncoding::ClassIndex { classes } => parse_finite(raw)
                .filter(|v| is_class_index(*v) && (*v as usize) < *classes),
            LabelEncoding::Vocabulary(vocab) => vocab.index_of(raw).map(|i| i as f64),
        }
    }

    /// Human-readable label for a class index
    pub fn decode(&self, class: usize) -> Option<String> {
        match self {
            LabelEncoding::Continuous => None,
            LabelEncoding::ClassIndex { classes } => (class < *classes).then(|| class.to_string()),
            LabelEncoding::Vocabulary(vocab) => vocab.label_of(class).map(str::to_string),
        }
    }
}

/// Per-feature standardization parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaling {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl FeatureScaling {
    /// Population mean / std per column; constant columns get std 1
    pub fn fit(features: &Array2<f64>) -> Self {
        let n = features.nrows().max(1) as f64;
        let mut mean = Vec::with_capacity(features.ncols());
        let mut std = Vec::with_capacity(features.ncols());

        for column in features.columns() {
            let m = column.sum() / n;
            let var = column.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / n;
            let s = var.sqrt();
            mean.push(m);
            std.push(if s > f64::EPSILON && s.is_finite() { s } else { 1.0 });
        }

        Self { mean, std }
    }

    pub fn apply(&self, features: &mut Array2<f64>) {
        for mut row in features.rows_mut() {
            for (j, x) in row.iter_mut().enumerate() {
                *x = (*x - self.mean[j]) / self.std[j];
            }
        }
    }

    pub fn apply_row(&self, row: &mut [f64]) {
        for (j, x) in row.iter_mut().enumerate() {
            *x = (*x - self.mean[j]) / self.std[j];
        }
    }
}

/// Numeric training set produced by [`split`]
#[derive(Clone, Debug)]
pub struct Dataset {
    /// rows × features, row-major, all finite
    pub features: Array2<f64>,
    /// Regression target or class index, one per row
    pub targets: Vec<f64>,
    pub feature_names: Vec<String>,
    pub label_name: String,
    pub labels: LabelEncoding,
    pub scaling: Option<FeatureScaling>,
    /// Data rows in the source table
    pub input_rows: usize,
    /// Data rows excluded as malformed
    pub dropped_rows: usize,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    pub fn feature_count(&self) -> usize {
        self.features.ncols()
    }

    pub fn task(&self) -> Task {
        self.labels.task()
    }

    /// BLAKE3 digest of the numeric contents, hex encoded
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.features.nrows() as u64).to_le_bytes());
        hasher.update(&(self.features.ncols() as u64).to_le_bytes());
        for x in self.features.iter() {
            hasher.update(&x.to_le_bytes());
        }
        for t in &self.targets {
            hasher.update(&t.to_le_bytes());
        }
        hex::encode(hasher.finalize().as_bytes())
    }
}

struct Candidate {
    row: usize,
    features: Vec<f64>,
    label: String,
}

/// Split a table into features and labels
pub fn split(table: &Table, config: &SplitConfig) -> Result<Dataset> {
    let width = table.column_count();
    if width < 2 {
        return Err(TrainerError::Schema(format!(
            "need at least 2 columns (features + label), found {}",
            width
        )));
    }

    let label_idx = resolve_label(table, &config.label)?;
    let mut dropped = 0usize;
    let mut reject = |row: usize, reason: String| -> Result<()> {
        match config.policy {
            MalformedRowPolicy::Drop => {
                dropped += 1;
                Ok(())
            }
            MalformedRowPolicy::Reject => Err(TrainerError::Schema(format!(
                "data row {}: {}",
                row + 1,
                reason
            ))),
        }
    };

    let mut candidates = Vec::with_capacity(table.row_count());
    for (row_idx, row) in table.rows.iter().enumerate() {
        match parse_row(row, width, label_idx) {
            Ok((features, label)) => candidates.push(Candidate {
                row: row_idx,
                features,
                label,
            }),
            Err(reason) => reject(row_idx, reason)?,
        }
    }

    let encoding = choose_encoding(&candidates, config);

    let mut flat = Vec::with_capacity(candidates.len() * (width - 1));
    let mut targets = Vec::with_capacity(candidates.len());
    let mut vocab = LabelVocabulary::new();
    for candidate in candidates {
        let target = match &encoding {
            LabelEncoding::Vocabulary(_) => Some(vocab.intern(&candidate.label) as f64),
            other => other.encode(&candidate.label),
        };
        match target {
            Some(target) => {
                flat.extend_from_slice(&candidate.features);
                targets.push(target);
            }
            None => reject(
                candidate.row,
                format!("label '{}' is not numeric", candidate.label),
            )?,
        }
    }
    let labels = match encoding {
        LabelEncoding::Vocabulary(_) => LabelEncoding::Vocabulary(vocab),
        other => other,
    };

    if targets.is_empty() {
        return Err(TrainerError::Schema(format!(
            "no usable rows: {} of {} data rows were malformed",
            dropped,
            table.row_count()
        )));
    }

    let mut features = Array2::from_shape_vec((targets.len(), width - 1), flat)
        .map_err(|err| TrainerError::Schema(err.to_string()))?;

    let scaling = config.standardize.then(|| {
        let scaling = FeatureScaling::fit(&features);
        scaling.apply(&mut features);
        scaling
    });

    if dropped > 0 {
        tracing::warn!("Dropped {} malformed rows of {}", dropped, table.row_count());
    }
    if let Task::Classification { classes } = labels.task() {
        if classes > config.max_classes {
            tracing::warn!(
                "Label column has {} distinct values, more than max_classes = {}",
                classes,
                config.max_classes
            );
        }
    }

    let (feature_names, label_name) = column_names(table, label_idx);
    let dataset = Dataset {
        features,
        targets,
        feature_names,
        label_name,
        labels,
        scaling,
        input_rows: table.row_count(),
        dropped_rows: dropped,
    };

    tracing::info!(
        "Split {} rows with {} features, task: {}",
        dataset.len(),
        dataset.feature_count(),
        dataset.task()
    );
    Ok(dataset)
}

fn resolve_label(table: &Table, label: &LabelColumn) -> Result<usize> {
    match label {
        LabelColumn::Last => Ok(table.column_count() - 1),
        LabelColumn::Name(name) => table.column_index(name).ok_or_else(|| {
            TrainerError::Schema(format!("label column '{}' not found in header", name))
        }),
        LabelColumn::Index(idx) if *idx < table.column_count() => Ok(*idx),
        LabelColumn::Index(idx) => Err(TrainerError::Schema(format!(
            "label column index {} out of range for {} columns",
            idx,
            table.column_count()
        ))),
    }
}

fn parse_row(
    row: &[String],
    width: usize,
    label_idx: usize,
) -> std::result::Result<(Vec<f64>, String), String> {
    if row.len() != width {
        return Err(format!("expected {} cells, got {}", width, row.len()));
    }

    let mut features = Vec::with_capacity(width - 1);
    for (col, cell) in row.iter().enumerate() {
        if col == label_idx {
            continue;
        }
        let value = parse_finite(cell)
            .ok_or_else(|| format!("column {}: '{}' is not a finite number", col + 1, cell))?;
        features.push(value);
    }

    let label = &row[label_idx];
    if label.is_empty() {
        return Err("empty label".to_string());
    }
    Ok((features, label.clone()))
}

fn choose_encoding(candidates: &[Candidate], config: &SplitConfig) -> LabelEncoding {
    let numeric: Option<Vec<f64>> = candidates.iter().map(|c| parse_finite(&c.label)).collect();

    match (config.task, numeric) {
        (TaskKind::Regression, _) => LabelEncoding::Continuous,
        (TaskKind::Auto, None) => LabelEncoding::Vocabulary(LabelVocabulary::new()),
        (TaskKind::Auto, Some(values)) => match class_count(&values) {
            Some(classes) if classes <= config.max_classes => LabelEncoding::ClassIndex { classes },
            _ => LabelEncoding::Continuous,
        },
        (TaskKind::Classification, Some(values)) => match class_count(&values) {
            Some(classes) if classes <= config.max_classes => LabelEncoding::ClassIndex { classes },
            _ => LabelEncoding::Vocabulary(LabelVocabulary::new()),
        },
        (TaskKind::Classification, None) => LabelEncoding::Vocabulary(LabelVocabulary::new()),
    }
}

/// `max + 1` when every value is a non-negative integer
fn class_count(values: &[f64]) -> Option<usize> {
    if values.is_empty() || !values.iter().all(|v| is_class_index(*v)) {
        return None;
    }
    values.iter().map(|v| *v as usize).max().map(|max| max + 1)
}

fn is_class_index(v: f64) -> bool {
    v >= 0.0 && v.fract() == 0.0 && v < u32::MAX as f64
}

fn parse_finite(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn column_names(table: &Table, label_idx: usize) -> (Vec<String>, String) {
    let features = table
        .headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != label_idx)
        .map(|(_, h)| h.clone())
        .collect();
    (features, table.headers[label_idx].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn table(text: &str) -> Table {
        Table::from_reader(std::io::Cursor::new(text.as_bytes().to_vec()), "inline")
            .expect("inline table")
    }

    fn raw() -> SplitConfig {
        SplitConfig {
            standardize: false,
            ..SplitConfig::default()
        }
    }

    #[test]
    fn test_split_class_index_labels() -> Result<()> {
        let t = table("a,b,label\n1,2,0\n3,4,1\n5,6,0\n");
        let ds = split(&t, &raw())?;

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.feature_count(), 2);
        assert_eq!(ds.targets, vec![0.0, 1.0, 0.0]);
        assert_eq!(ds.task(), Task::Classification { classes: 2 });
        assert_eq!(ds.features[[1, 0]], 3.0);
        assert_eq!(ds.feature_names, vec!["a", "b"]);
        assert_eq!(ds.label_name, "label");
        Ok(())
    }

    #[test]
    fn test_non_numeric_feature_row_is_dropped() -> Result<()> {
        let t = table("a,b,y\n1,2,0.5\nx,4,1.5\n5,6,2.5\n7,,3.5\n");
        let ds = split(&t, &raw())?;

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.dropped_rows, 2);
        assert_eq!(ds.len() + ds.dropped_rows, t.row_count());
        assert_eq!(ds.task(), Task::Regression);
        Ok(())
    }

    #[test]
    fn test_short_and_long_rows_are_dropped() -> Result<()> {
        let t = table("a,b,y\n1,2,0\n1,2\n1,2,3,4\n");
        let ds = split(&t, &raw())?;
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.dropped_rows, 2);
        Ok(())
    }

    #[test]
    fn test_non_finite_cells_are_malformed() -> Result<()> {
        let t = table("a,y\nNaN,1\ninf,2\n3,1\n");
        let ds = split(&t, &raw())?;
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.dropped_rows, 2);
        Ok(())
    }

    #[test]
    fn test_all_rows_malformed_is_schema_error() {
        let t = table("a,b,y\nx,2,0\n1,y,1\n");
        assert!(matches!(split(&t, &raw()), Err(TrainerError::Schema(_))));
    }

    #[test]
    fn test_header_only_is_schema_error() {
        let t = table("a,b,y\n");
        assert!(matches!(split(&t, &raw()), Err(TrainerError::Schema(_))));
    }

    #[test]
    fn test_single_column_is_schema_error() {
        let t = table("only\n1\n2\n");
        assert!(matches!(split(&t, &raw()), Err(TrainerError::Schema(_))));
    }

    #[test]
    fn test_reject_policy_names_the_row() {
        let t = table("a,y\n1,0\nbad,1\n");
        let config = SplitConfig {
            policy: MalformedRowPolicy::Reject,
            ..raw()
        };
        match split(&t, &config) {
            Err(TrainerError::Schema(msg)) => assert!(msg.contains("data row 2"), "{}", msg),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_string_labels_build_vocabulary_in_first_seen_order() -> Result<()> {
        let t = table("x,kind\n1,setosa\n2,virginica\n3,setosa\n4,versicolor\n");
        let ds = split(&t, &raw())?;

        assert_eq!(ds.targets, vec![0.0, 1.0, 0.0, 2.0]);
        match &ds.labels {
            LabelEncoding::Vocabulary(vocab) => {
                assert_eq!(vocab.labels(), &["setosa", "virginica", "versicolor"]);
                assert_eq!(vocab.index_of("versicolor"), Some(2));
            }
            other => panic!("expected vocabulary, got {:?}", other),
        }
        assert_eq!(ds.labels.decode(1).as_deref(), Some("virginica"));
        Ok(())
    }

    #[test]
    fn test_label_by_name() -> Result<()> {
        let t = table("target,a,b\n1.5,1,2\n2.5,3,4\n");
        let config = SplitConfig {
            label: LabelColumn::Name("target".into()),
            ..raw()
        };
        let ds = split(&t, &config)?;
        assert_eq!(ds.feature_names, vec!["a", "b"]);
        assert_eq!(ds.targets, vec![1.5, 2.5]);
        Ok(())
    }

    #[test]
    fn test_label_by_index() -> Result<()> {
        let t = table("y,a,b\n1,2,3\n0,4,5\n");
        let config = SplitConfig {
            label: LabelColumn::Index(0),
            ..raw()
        };
        let ds = split(&t, &config)?;
        assert_eq!(ds.label_name, "y");
        assert_eq!(ds.feature_names, vec!["a", "b"]);
        assert_eq!(ds.targets, vec![1.0, 0.0]);
        assert_eq!(ds.features.row(1).to_vec(), vec![4.0, 5.0]);
        Ok(())
    }

    #[test]
    fn test_label_index_out_of_range_is_schema_error() {
        let t = table("a,b,c\n1,2,3\n");
        let config = SplitConfig {
            label: LabelColumn::Index(5),
            ..raw()
        };
        assert!(matches!(split(&t, &config), Err(TrainerError::Schema(_))));
    }

    #[test]
    fn test_forced_classification_of_fractional_labels_uses_vocabulary() -> Result<()> {
        let t = table("x,y\n1,0.5\n2,1.5\n3,0.5\n");
        let config = SplitConfig {
            task: TaskKind::Classification,
            ..raw()
        };
        let ds = split(&t, &config)?;
        match &ds.labels {
            LabelEncoding::Vocabulary(vocab) => assert_eq!(vocab.labels(), ["0.5", "1.5"]),
            other => panic!("expected vocabulary, got {:?}", other),
        }
        assert_eq!(ds.targets, vec![0.0, 1.0, 0.0]);
        assert_eq!(ds.task(), Task::Classification { classes: 2 });
        Ok(())
    }

    #[test]
    fn test_forced_classification_above_max_classes_uses_vocabulary() -> Result<()> {
        let t = table("x,code\n1,100\n2,250\n3,100\n");
        let config = SplitConfig {
            task: TaskKind::Classification,
            ..raw()
        };
        let ds = split(&t, &config)?;
        match &ds.labels {
            LabelEncoding::Vocabulary(vocab) => assert_eq!(vocab.labels(), ["100", "250"]),
            other => panic!("expected vocabulary, got {:?}", other),
        }
        assert_eq!(ds.targets, vec![0.0, 1.0, 0.0]);
        assert_eq!(ds.labels.decode(1).as_deref(), Some("250"));
        Ok(())
    }

    #[test]
    fn test_unknown_label_name_is_schema_error() {
        let t = table("a,b\n1,2\n");
        let config = SplitConfig {
            label: LabelColumn::Name("missing".into()),
            ..raw()
        };
        assert!(matches!(split(&t, &config), Err(TrainerError::Schema(_))));
    }

    #[test]
    fn test_forced_regression_drops_text_labels() -> Result<()> {
        let t = table("a,y\n1,2.0\n2,high\n3,4.0\n");
        let config = SplitConfig {
            task: TaskKind::Regression,
            ..raw()
        };
        let ds = split(&t, &config)?;
        assert_eq!(ds.targets, vec![2.0, 4.0]);
        assert_eq!(ds.dropped_rows, 1);
        Ok(())
    }

    #[test]
    fn test_large_integral_labels_fall_back_to_regression() -> Result<()> {
        let t = table("a,price\n1,100\n2,250\n3,400\n");
        let ds = split(&t, &raw())?;
        assert_eq!(ds.task(), Task::Regression);
        Ok(())
    }

    #[test]
    fn test_standardize_zero_mean() -> Result<()> {
        let t = table("a,b,y\n1,10,0\n2,10,1\n3,10,0\n");
        let ds = split(&t, &SplitConfig::default())?;

        let scaling = ds.scaling.as_ref().expect("scaling");
        assert_eq!(scaling.mean, vec![2.0, 10.0]);
        assert_eq!(scaling.std[1], 1.0);
        let col0: f64 = ds.features.column(0).sum();
        assert!(col0.abs() < 1e-12);
        assert_eq!(ds.features[[0, 1]], 0.0);
        Ok(())
    }

    #[test]
    fn test_fingerprint_is_stable() -> Result<()> {
        let t = table("a,b,y\n1,2,0\n3,4,1\n");
        let ds1 = split(&t, &raw())?;
        let ds2 = split(&t, &raw())?;
        assert_eq!(ds1.fingerprint(), ds2.fingerprint());
        assert_eq!(ds1.fingerprint().len(), 64);
        Ok(())
    }

    #[test]
    fn test_vocabulary_serde_round_trip_rebuilds_index() -> Result<()> {
        let mut vocab = LabelVocabulary::new();
        vocab.intern("low");
        vocab.intern("high");
        let json = serde_json::to_string(&vocab)?;
        assert_eq!(json, r#"["low","high"]"#);
        let back: LabelVocabulary = serde_json::from_str(&json)?;
        assert_eq!(back.index_of("high"), Some(1));
        Ok(())
    }
}
