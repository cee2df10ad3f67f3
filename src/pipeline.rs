//! Per-file pipeline: analyze → complete → persist → merge into the site.

use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use chrono::Utc;
use heck::ToKebabCase;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::{
    analysis::{self, AnalysisKind},
    completer::{
        CommandCompleter, FieldCompleter, PassthroughCompleter, reconcile, with_timeout,
    },
    config::Settings,
    document::Document,
    merge::{MergeReport, merge_with_report},
    rows::Table,
    store::{FileRecord, FileSummary, Store},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub id: String,
    pub name: String,
}

impl Site {
    /// A site identified by the kebab-case slug of its display name.
    pub fn named(name: &str) -> Result<Self> {
        let id = name.to_kebab_case();
        ensure!(!id.is_empty(), "Site name {name:?} has no usable characters");
        Ok(Self {
            id,
            name: name.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Upload {
    /// Generated (UUID v4) when absent.
    pub file_id: Option<String>,
    pub kind: AnalysisKind,
    pub table: Table,
    /// SHA-256 of the uploaded bytes.
    pub digest: String,
    pub site: Option<Site>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub file_id: String,
    pub analysis: Document,
    /// Cumulative state after the merge; `None` for uploads without a site.
    pub site_state: Option<Document>,
    pub merge_report: MergeReport,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RollupOutcome {
    pub kind: AnalysisKind,
    pub file_count: usize,
    pub analysis: Document,
    pub warnings: Vec<String>,
}

pub struct Pipeline {
    settings: Settings,
    completer: Arc<dyn FieldCompleter>,
    store: Arc<dyn Store>,
}

impl Pipeline {
    /// Builds a pipeline whose completer comes from `settings`: the configured
    /// command when there is one, otherwise a passthrough. A command still
    /// running at the completer timeout is killed.
    pub fn new(settings: Settings, store: Arc<dyn Store>) -> Self {
        let completer: Arc<dyn FieldCompleter> = match settings
            .completer_command
            .as_deref()
            .and_then(CommandCompleter::from_command)
        {
            Some(command) => Arc::new(command.with_deadline(settings.completer_timeout)),
            None => Arc::new(PassthroughCompleter),
        };
        Self::with_completer(settings, store, completer)
    }

    pub fn with_completer(
        settings: Settings,
        store: Arc<dyn Store>,
        completer: Arc<dyn FieldCompleter>,
    ) -> Self {
        let completer = Arc::new(with_timeout(completer, settings.completer_timeout));
        Self {
            settings,
            completer,
            store,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn process(&self, upload: Upload) -> Result<PipelineOutcome> {
        let file_id = upload
            .file_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.process_file(&file_id, upload.kind, upload.table, &upload.digest, upload.site)
            .with_context(|| format!("Processing file {file_id}"))
    }

    fn process_file(
        &self,
        file_id: &str,
        kind: AnalysisKind,
        table: Table,
        digest: &str,
        site: Option<Site>,
    ) -> Result<PipelineOutcome> {
        info!(
            "Analyzing file {file_id} as {kind} ({} row(s), {} column(s))",
            table.row_count(),
            table.columns().len()
        );
        let mut warnings = Vec::new();
        let rows = table.to_records();
        let partial = analysis::analyze(kind, &table, &self.settings);
        let analysis = self.complete(kind, &partial, &rows, &mut warnings);

        let record = FileRecord {
            file_id: file_id.to_string(),
            site_id: site.as_ref().map(|s| s.id.clone()),
            site_name: site.as_ref().map(|s| s.name.clone()),
            kind,
            uploaded_at: Utc::now(),
            summary: FileSummary::of(&table, digest),
            data_records: rows,
            analysis: Some(analysis.clone()),
            warnings: warnings.clone(),
        };
        self.store
            .put_file_record(&record)
            .context("Persisting file record")?;

        let Some(site) = site else {
            return Ok(PipelineOutcome {
                file_id: file_id.to_string(),
                analysis,
                site_state: None,
                merge_report: MergeReport::default(),
                warnings,
            });
        };

        let mut merge_report = MergeReport::default();
        let merged = self
            .store
            .update_site_state(&site.id, &mut |existing: Option<Document>| {
                let (merged, report) = merge_with_report(&existing.unwrap_or_default(), &analysis);
                merge_report = report;
                merged
            })
            .with_context(|| format!("Updating state for site '{}'", site.id))?;
        for conflict in &merge_report.conflicts {
            warnings.push(format!(
                "Kept existing {} at '{}' over incoming {}",
                conflict.existing, conflict.path, conflict.incoming
            ));
        }
        info!("Merged file {file_id} into site '{}'", site.id);

        Ok(PipelineOutcome {
            file_id: file_id.to_string(),
            analysis,
            site_state: Some(merged),
            merge_report,
            warnings,
        })
    }

    /// Runs the completer and reconciles its reply with `partial`. Any failure
    /// falls back to the partial and records a warning.
    fn complete(
        &self,
        kind: AnalysisKind,
        partial: &Document,
        rows: &[Document],
        warnings: &mut Vec<String>,
    ) -> Document {
        match self.completer.complete(partial, rows, kind) {
            Ok(reply) => {
                let conformed = kind.template().conform(&reply);
                reconcile(partial, &conformed)
            }
            Err(err) => {
                warn!("Field completion failed for {kind} analysis: {err}");
                warnings.push(format!("Field completion failed: {err}"));
                partial.clone()
            }
        }
    }

    /// Re-analyzes every stored file of `kind` as one combined table,
    /// optionally restricted to one site.
    pub fn rollup(&self, kind: AnalysisKind, site_id: Option<&str>) -> Result<RollupOutcome> {
        let records = self
            .store
            .list_file_records()
            .context("Listing file records")?
            .into_iter()
            .filter(|record| record.kind == kind)
            .filter(|record| site_id.is_none_or(|id| record.site_id.as_deref() == Some(id)))
            .collect::<Vec<_>>();
        if records.is_empty() {
            match site_id {
                Some(id) => bail!("No {kind} files have been processed for site '{id}'"),
                None => bail!("No {kind} files have been processed"),
            }
        }
        debug!("Rolling up {} {kind} file(s)", records.len());

        let tables = records.iter().map(FileRecord::table).collect::<Vec<_>>();
        let combined = Table::concat(&tables);
        let mut warnings = Vec::new();
        let mut partial = analysis::analyze(kind, &combined, &self.settings);
        partial.insert("file_count", records.len() as i64);
        let analysis = self.complete(kind, &partial, &combined.to_records(), &mut warnings);
        Ok(RollupOutcome {
            kind,
            file_count: records.len(),
            analysis,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;
    use crate::{
        document::Value,
        error::CompleterError,
        store::MemoryStore,
    };

    fn readings(column: &str, values: &[Option<f64>]) -> Table {
        let mut table = Table::new(vec![column.to_string()]);
        for value in values {
            table.push_row(vec![Value::from(*value)]).unwrap();
        }
        table
    }

    fn energy_table(values: &[Option<f64>]) -> Table {
        readings("energy_kwh", values)
    }

    fn upload(table: Table, site: Option<Site>) -> Upload {
        Upload {
            file_id: None,
            kind: AnalysisKind::Environmental,
            table,
            digest: "0".repeat(64),
            site,
        }
    }

    struct Failing;

    impl FieldCompleter for Failing {
        fn complete(
            &self,
            _partial: &Document,
            _rows: &[Document],
            _kind: AnalysisKind,
        ) -> Result<Document, CompleterError> {
            Err(CompleterError::Malformed("not json".into()))
        }
    }

    struct Hanging;

    impl FieldCompleter for Hanging {
        fn complete(
            &self,
            partial: &Document,
            _rows: &[Document],
            _kind: AnalysisKind,
        ) -> Result<Document, CompleterError> {
            thread::sleep(Duration::from_millis(500));
            Ok(partial.clone())
        }
    }

    #[test]
    fn site_names_become_slugs() {
        assert_eq!(Site::named("North Plant 2").unwrap().id, "north-plant-2");
        assert!(Site::named("  ").is_err());
    }

    #[test]
    fn two_uploads_accumulate_into_site_state() {
        let pipeline = Pipeline::new(Settings::default(), Arc::new(MemoryStore::new()));
        let site = Site::named("North").unwrap();
        let total = ["partial_analysis", "emissions", "total_emissions_kg"];

        let first = pipeline
            .process(upload(
                readings("CO2_kg", &[Some(10.0), Some(20.0), None]),
                Some(site.clone()),
            ))
            .unwrap();
        assert_eq!(first.analysis.number_at(&total), Some(30.0));
        assert_eq!(
            first
                .analysis
                .number_at(&["partial_analysis", "emissions", "total", "CO2_kg"]),
            Some(30.0)
        );
        assert_eq!(
            first
                .analysis
                .number_at(&["partial_analysis", "emissions", "average", "CO2_kg"]),
            Some(15.0)
        );
        assert_eq!(
            first.site_state.unwrap().number_at(&total),
            Some(30.0)
        );

        let second = pipeline
            .process(upload(
                readings("CO2_kg", &[Some(5.0), None, Some(5.0)]),
                Some(site.clone()),
            ))
            .unwrap();
        let state = second.site_state.unwrap();
        assert_eq!(state.number_at(&total), Some(40.0));
        assert_eq!(state.get("file_count"), Some(&Value::Integer(2)));
        assert_eq!(state.get("record_count"), Some(&Value::Integer(6)));
        assert_eq!(
            pipeline.store().get_site_state(&site.id).unwrap(),
            Some(state)
        );
    }

    #[test]
    fn site_keeps_its_first_matched_columns() {
        let pipeline = Pipeline::new(Settings::default(), Arc::new(MemoryStore::new()));
        let site = Site::named("North").unwrap();
        let matched = ["partial_analysis", "emissions", "matched_columns"];

        pipeline
            .process(upload(
                readings("CO2_kg", &[Some(10.0), Some(20.0), None]),
                Some(site.clone()),
            ))
            .unwrap();
        let second = pipeline
            .process(upload(
                readings("Carbon_Output_kg", &[Some(5.0), None, Some(5.0)]),
                Some(site),
            ))
            .unwrap();
        assert_eq!(
            second.analysis.at(&matched),
            Some(&Value::from(vec!["Carbon_Output_kg".to_string()]))
        );

        let state = second.site_state.unwrap();
        assert_eq!(
            state.at(&matched),
            Some(&Value::from(vec!["CO2_kg".to_string()]))
        );
        assert_eq!(
            state.number_at(&["partial_analysis", "emissions", "total_emissions_kg"]),
            Some(40.0)
        );
        assert_eq!(
            state.number_at(&["partial_analysis", "emissions", "total", "Carbon_Output_kg"]),
            Some(10.0)
        );
    }

    #[test]
    fn uploads_without_a_site_only_store_the_record() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(Settings::default(), store.clone());
        let outcome = pipeline
            .process(upload(energy_table(&[Some(1.0)]), None))
            .unwrap();
        assert!(outcome.site_state.is_none());
        let record = store.get_file_record(&outcome.file_id).unwrap().unwrap();
        assert_eq!(record.summary.rows, 1);
        assert_eq!(record.analysis, Some(outcome.analysis));
    }

    #[test]
    fn completer_failure_falls_back_with_warning() {
        let pipeline = Pipeline::with_completer(
            Settings::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(Failing),
        );
        let outcome = pipeline
            .process(upload(energy_table(&[Some(3.0)]), None))
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("malformed"));
        assert_eq!(
            outcome
                .analysis
                .number_at(&["partial_analysis", "energy", "total_energy_kwh"]),
            Some(3.0)
        );
    }

    #[test]
    fn completer_timeout_falls_back_with_warning() {
        let mut settings = Settings::default();
        settings.completer_timeout = Duration::from_millis(20);
        let pipeline =
            Pipeline::with_completer(settings, Arc::new(MemoryStore::new()), Arc::new(Hanging));
        let outcome = pipeline
            .process(upload(energy_table(&[Some(3.0)]), None))
            .unwrap();
        assert!(outcome.warnings[0].contains("did not answer"));
    }

    #[test]
    fn concurrent_uploads_to_one_site_are_serialised() {
        const UPLOADS: usize = 8;
        let pipeline = Arc::new(Pipeline::new(
            Settings::default(),
            Arc::new(MemoryStore::new()),
        ));
        let site = Site::named("Shared").unwrap();
        let workers = (0..UPLOADS)
            .map(|_| {
                let pipeline = Arc::clone(&pipeline);
                let site = site.clone();
                thread::spawn(move || {
                    pipeline
                        .process(upload(energy_table(&[Some(1.0)]), Some(site)))
                        .unwrap();
                })
            })
            .collect::<Vec<_>>();
        for worker in workers {
            worker.join().unwrap();
        }
        let state = pipeline.store().get_site_state(&site.id).unwrap().unwrap();
        assert_eq!(state.get("file_count"), Some(&Value::Integer(UPLOADS as i64)));
        assert_eq!(
            state.number_at(&["partial_analysis", "energy", "total_energy_kwh"]),
            Some(UPLOADS as f64)
        );
    }

    #[test]
    fn rollup_reanalyzes_stored_rows() {
        let pipeline = Pipeline::new(Settings::default(), Arc::new(MemoryStore::new()));
        let north = Site::named("North").unwrap();
        let south = Site::named("South").unwrap();
        pipeline
            .process(upload(energy_table(&[Some(10.0), Some(20.0)]), Some(north.clone())))
            .unwrap();
        pipeline
            .process(upload(energy_table(&[Some(6.0)]), Some(south)))
            .unwrap();

        let all = pipeline.rollup(AnalysisKind::Environmental, None).unwrap();
        assert_eq!(all.file_count, 2);
        assert_eq!(all.analysis.get("file_count"), Some(&Value::Integer(2)));
        assert_eq!(all.analysis.get("record_count"), Some(&Value::Integer(3)));
        assert_eq!(
            all.analysis
                .number_at(&["partial_analysis", "energy", "average", "energy_kwh"]),
            Some(12.0)
        );

        let north_only = pipeline
            .rollup(AnalysisKind::Environmental, Some(&north.id))
            .unwrap();
        assert_eq!(north_only.file_count, 1);

        assert!(pipeline.rollup(AnalysisKind::Financial, None).is_err());
    }

    #[test]
    fn rollup_keeps_upload_column_order() {
        let pipeline = Pipeline::new(Settings::default(), Arc::new(MemoryStore::new()));
        let mut table = Table::new(vec!["Zeta_kWh".into(), "Alpha_kWh".into()]);
        table
            .push_row(vec![Value::Integer(1), Value::Integer(2)])
            .unwrap();
        let matched = ["partial_analysis", "energy", "matched_columns"];
        let expected = Value::from(vec!["Zeta_kWh".to_string(), "Alpha_kWh".to_string()]);

        let outcome = pipeline.process(upload(table, None)).unwrap();
        assert_eq!(outcome.analysis.at(&matched), Some(&expected));

        let rollup = pipeline.rollup(AnalysisKind::Environmental, None).unwrap();
        assert_eq!(rollup.analysis.at(&matched), Some(&expected));
    }
}
