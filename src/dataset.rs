//! Dataset rows and their delimited-text rendering.

use std::io::Write;

use tracing::info;

use crate::error::Result;
use crate::lineage::ReleaseSnapshot;
use crate::metrics::FileRecord;
use crate::model::ReleaseIndex;
use crate::releases::ReleaseWindowIndex;

/// Column layout of the written dataset. `Buggy` is always the last column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schema {
    #[default]
    Compact,
    /// Adds the `MAX_*` columns next to their totals.
    Extended,
}

impl Schema {
    pub fn header(self) -> Vec<&'static str> {
        let mut columns = vec![
            "Project", "Version", "Filename", "Size", "LOC_touched", "NR", "NFix", "NAuth",
            "LOC_added",
        ];
        if self == Schema::Extended {
            columns.push("MAX_LOC_added");
        }
        columns.extend(["AVG_LOC_added", "Churn"]);
        if self == Schema::Extended {
            columns.push("MAX_Churn");
        }
        columns.extend(["AVG_Churn", "ChgSetSize"]);
        if self == Schema::Extended {
            columns.push("MAX_ChgSet");
        }
        columns.extend(["AVG_ChgSet", "Age", "Buggy"]);
        columns
    }
}

/// One file in one release.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub project: String,
    pub release: String,
    pub filename: String,
    pub size: i64,
    pub loc_touched: u64,
    pub revisions: usize,
    pub fixes: u32,
    pub authors: usize,
    pub loc_added: u64,
    pub max_loc_added: u64,
    pub avg_loc_added: f64,
    pub churn: u64,
    pub max_churn: u64,
    pub avg_churn: f64,
    pub change_set: usize,
    pub max_change_set: usize,
    pub avg_change_set: f64,
    pub age: i64,
    pub buggy: bool,
}

impl DatasetRow {
    pub fn from_record(project: &str, release_name: &str, release: ReleaseIndex, file: &FileRecord) -> Self {
        let m = &file.metrics;
        Self {
            project: project.to_string(),
            release: release_name.to_string(),
            filename: file.filename.clone(),
            size: file.size,
            loc_touched: m.loc_touched(release),
            revisions: m.revision_count(release),
            fixes: file.fix_count,
            authors: file.author_count(),
            loc_added: m.loc_added(release),
            max_loc_added: m.max_loc_added(release),
            avg_loc_added: m.avg_loc_added(release),
            churn: m.churn(release),
            max_churn: m.max_churn(release),
            avg_churn: m.avg_churn(release),
            change_set: m.change_set_size(release),
            max_change_set: m.max_change_set(release),
            avg_change_set: m.avg_change_set(release),
            age: file.age_weeks,
            buggy: file.is_buggy(release),
        }
    }

    pub fn fields(&self, schema: Schema) -> Vec<String> {
        let extended = schema == Schema::Extended;
        let mut fields = vec![
            self.project.clone(),
            self.release.clone(),
            self.filename.clone(),
            self.size.to_string(),
            self.loc_touched.to_string(),
            self.revisions.to_string(),
            self.fixes.to_string(),
            self.authors.to_string(),
            self.loc_added.to_string(),
        ];
        if extended {
            fields.push(self.max_loc_added.to_string());
        }
        fields.push(self.avg_loc_added.to_string());
        fields.push(self.churn.to_string());
        if extended {
            fields.push(self.max_churn.to_string());
        }
        fields.push(self.avg_churn.to_string());
        fields.push(self.change_set.to_string());
        if extended {
            fields.push(self.max_change_set.to_string());
        }
        fields.push(self.avg_change_set.to_string());
        fields.push(self.age.to_string());
        fields.push(if self.buggy { "Yes" } else { "No" }.to_string());
        fields
    }
}

pub struct DatasetAssembler<'a> {
    project: &'a str,
    releases: &'a ReleaseWindowIndex,
    reliable_only: bool,
}

impl<'a> DatasetAssembler<'a> {
    pub fn new(project: &'a str, releases: &'a ReleaseWindowIndex) -> Self {
        Self { project, releases, reliable_only: true }
    }

    /// Whether to keep only the first half of the releases, whose labels had time to settle.
    pub fn reliable_only(mut self, reliable_only: bool) -> Self {
        self.reliable_only = reliable_only;
        self
    }

    pub fn assemble(&self, snapshots: &[ReleaseSnapshot]) -> Vec<DatasetRow> {
        let limit = if self.reliable_only {
            self.releases.reliable_prefix()
        } else {
            self.releases.len()
        };

        let mut rows = Vec::new();
        for snapshot in snapshots.iter().filter(|s| s.release <= limit) {
            let Some(name) = self.releases.name(snapshot.release) else {
                continue;
            };
            rows.extend(
                snapshot
                    .files()
                    .filter(|file| !file.deleted && file.size >= 0)
                    .map(|file| DatasetRow::from_record(self.project, name, snapshot.release, file)),
            );
        }

        info!(rows = rows.len(), releases = limit, "Assembled dataset");
        rows
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Writes the header and rows as comma-separated text.
pub fn write_csv<W: Write>(writer: &mut W, rows: &[DatasetRow], schema: Schema) -> Result<()> {
    writeln!(writer, "{}", schema.header().join(","))?;
    for row in rows {
        let line: Vec<String> = row.fields(schema).iter().map(|f| escape(f)).collect();
        writeln!(writer, "{}", line.join(","))?;
    }
    writer.flush()?;
    Ok(())
}
