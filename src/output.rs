use std::io::{self, Write};

use serde::Serialize;

use crate::app::RunReport;
use crate::domain::EntityKind;
use crate::ontology::{Entity, Ontology};
use crate::package::PackageSummary;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub report: &'a RunReport,
    pub package: &'a PackageSummary,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(summary: &RunSummary<'_>) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_list(ontology: &Ontology, kind: EntityKind) -> io::Result<()> {
        Self::print_json(&ontology.all(kind))
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_run(summary: &RunSummary<'_>) -> io::Result<()> {
        Self::write_run(&mut io::stdout().lock(), summary)
    }

    pub fn write_run<W: Write>(out: &mut W, summary: &RunSummary<'_>) -> io::Result<()> {
        let report = summary.report;
        writeln!(out, "BRACE run summary")?;
        writeln!(
            out,
            "  units:      {} ingested, {} skipped, {} planned",
            report.units_ingested,
            report.units_skipped.len(),
            report.units_total
        )?;
        writeln!(
            out,
            "  rows:       {} read, {} accepted, {} dropped",
            report.rows_read,
            report.rows_accepted,
            report.rows_dropped_total()
        )?;
        for (kind, count) in &report.rows_dropped {
            writeln!(out, "    {kind}: {count}")?;
        }
        writeln!(out, "  aggregates: {}", report.aggregates)?;
        writeln!(out, "  elapsed:    {} ms", report.elapsed_ms)?;
        for skipped in &report.units_skipped {
            writeln!(
                out,
                "  skipped {} {} {}: {}",
                skipped.pollutant, skipped.region, skipped.year, skipped.reason
            )?;
        }
        writeln!(out, "  package:    {}", summary.package.path)?;
        Ok(())
    }

    pub fn print_list(ontology: &Ontology, kind: EntityKind) -> io::Result<()> {
        Self::write_list(&mut io::stdout().lock(), ontology, kind)
    }

    pub fn write_list<W: Write>(out: &mut W, ontology: &Ontology, kind: EntityKind) -> io::Result<()> {
        for entity in ontology.all(kind) {
            match entity {
                Entity::Pollutant(p) => writeln!(out, "{:>5}  {:<6} {}", p.code.get(), p.formula, p.name)?,
                Entity::Region(r) => writeln!(
                    out,
                    "{:>5}  {:<24} {:.3} {:.3}",
                    r.code.get(), r.name, r.latitude, r.longitude
                )?,
                Entity::Station(s) => writeln!(out, "{:>5}  {}", s.region.get(), s.name)?,
            }
        }
        Ok(())
    }
}
