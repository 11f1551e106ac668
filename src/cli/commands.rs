use crate::core::reference::dependencies;
use crate::core::SheetReport;
use crate::error::{CalcError, CalcResult};
use crate::loader::{load_workbook, MANIFEST_FILE};
use crate::metadata::get_model_metadata;
use crate::runner::{run_calculation, run_with_reports, run_workbook};
use crate::types::{parse_decimal, CellValue, Coordinate, Overrides, ResultMap};
use colored::Colorize;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

/// Named override sets, as read from a scenarios file
pub type Scenarios = BTreeMap<String, Overrides>;

/// Options shared by `run` and `watch`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub inputs: Vec<String>,
    pub inputs_file: Option<PathBuf>,
    pub sheet: Option<String>,
    pub json: bool,
    pub verbose: bool,
}

/// Execute the run command
pub fn run(export_dir: PathBuf, options: RunOptions) -> CalcResult<()> {
    let overrides = collect_overrides(&options.inputs, options.inputs_file.as_deref())?;

    if options.json {
        let output = run_calculation(&overrides, &export_dir)?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", "🧮 Calc Model - Running".bold().green());
    println!("   Export: {}", export_dir.display());
    if !overrides.is_empty() {
        println!("   Inputs: {}", overrides.len().to_string().bright_yellow());
    }
    println!();

    run_internal(&export_dir, &overrides, &options)
}

fn run_internal(export_dir: &Path, overrides: &Overrides, options: &RunOptions) -> CalcResult<()> {
    let workbook = load_workbook(export_dir);
    let inputs: HashSet<(String, Coordinate)> = overrides
        .keys()
        .filter_map(|key| workbook.locate(key))
        .collect();
    let (output, reports) = run_with_reports(workbook, overrides)?;

    if !output.metadata.has_model {
        println!(
            "{}",
            format!("⚠️  No model found in {}", export_dir.display()).yellow()
        );
        return Ok(());
    }

    if options.verbose {
        print_reports(&reports);
    }

    if let Some(ref sheet) = options.sheet {
        if !reports.iter().any(|r| &r.sheet == sheet) {
            return Err(CalcError::Validation(format!(
                "Sheet '{}' not found. Available: {:?}",
                sheet,
                reports.iter().map(|r| r.sheet.as_str()).collect::<Vec<_>>()
            )));
        }
    }

    println!("{}", "✅ Results:".bold().green());
    for (sheet, cells) in group_by_sheet(&output.cells) {
        if options.sheet.as_ref().is_some_and(|s| s != &sheet) {
            continue;
        }
        println!("   📄 Sheet: {}", sheet.bright_blue().bold());
        for (coordinate, value) in cells {
            let marker = if inputs.contains(&(sheet.clone(), coordinate)) {
                " (input)".bright_yellow().to_string()
            } else {
                String::new()
            };
            println!(
                "      {:<8} = {}{}",
                coordinate.to_string().cyan(),
                format_value(value),
                marker
            );
        }
    }
    println!();

    let unresolved: usize = reports.iter().map(|r| r.unresolved.len()).sum();
    if unresolved > 0 {
        println!(
            "{}",
            format!("⚠️  {} formula cell(s) did not resolve", unresolved).yellow()
        );
    }

    Ok(())
}

fn print_reports(reports: &[SheetReport]) {
    println!("{}", "🔁 Convergence:".bold().cyan());
    for report in reports {
        let status = if report.converged() {
            "✅".to_string()
        } else {
            format!("⚠️  pending: {}", join_coordinates(report))
        };
        println!(
            "   {:<20} constants {:>4}  formulas {:>4}  resolved {:>4}  passes {:>3}  {}",
            report.sheet.bright_blue(),
            report.constants,
            report.formulas,
            report.resolved,
            report.passes,
            status
        );
    }
    println!();
}

fn join_coordinates(report: &SheetReport) -> String {
    report
        .unresolved
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Execute the model command
pub fn model(export_dir: PathBuf, json: bool) -> CalcResult<()> {
    let metadata = get_model_metadata(&export_dir);

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("{}", "📚 Calc Model - Model".bold().green());
    println!("   Export: {}", export_dir.display());
    println!();

    if !metadata.has_model {
        println!(
            "{}",
            format!("⚠️  No model found ({} missing or empty)", MANIFEST_FILE).yellow()
        );
        return Ok(());
    }

    println!("{}", "📋 Sheets:".bold().cyan());
    for info in &metadata.sheets {
        let active = if info.name == metadata.active_sheet {
            " (active)".bright_yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "   {:<24} {:<12} {}{}",
            info.name.bright_blue(),
            info.visibility,
            info.file.dimmed(),
            active
        );
    }
    println!();
    println!("{}", "✅ Model loaded".bold().green());

    Ok(())
}

/// Execute the deps command
pub fn deps(export_dir: PathBuf, cell: String) -> CalcResult<()> {
    let workbook = load_workbook(&export_dir);
    let (sheet, coordinate, stored) = workbook
        .cell(&cell)
        .ok_or_else(|| CalcError::Validation(format!("Cell '{}' not found", cell)))?;
    let sheet = sheet.to_string();
    let formula = stored.formula_text().map(str::to_string);

    println!("{}", "🔍 Calc Model - Dependencies".bold().green());
    println!("   Cell: {}!{}\n", sheet, coordinate.to_string().bright_blue().bold());

    let Some(formula) = formula else {
        println!("   No dependencies (constant)");
        return Ok(());
    };
    println!("   Formula: {}", formula.bright_yellow());
    println!();

    let keys = dependencies(&formula, &sheet);
    let output = run_workbook(workbook, &Overrides::new())?;

    println!("{}", "🌳 Reads:".bold().cyan());
    if keys.is_empty() {
        println!("   No cell references");
    }
    for key in &keys {
        let value = output
            .cells
            .get(key)
            .map(format_value)
            .unwrap_or_else(|| "-".dimmed().to_string());
        println!("   {:<24} = {}", key.cyan(), value);
    }

    let own_key = format!("{}!{}", sheet, coordinate);
    if let Some(value) = output.cells.get(&own_key) {
        println!();
        println!("   Result: {}", format_value(value).bold());
    }

    Ok(())
}

/// Execute the compare command
pub fn compare(
    export_dir: PathBuf,
    file: PathBuf,
    scenarios: Vec<String>,
    cells: Vec<String>,
) -> CalcResult<()> {
    let available = load_scenarios(&file)?;
    let selected: Vec<String> = if scenarios.is_empty() {
        available.keys().cloned().collect()
    } else {
        scenarios
    };

    for name in &selected {
        if !available.contains_key(name) {
            let names: Vec<_> = available.keys().collect();
            return Err(CalcError::Validation(format!(
                "Scenario '{}' not found. Available: {:?}",
                name, names
            )));
        }
    }

    println!("{}", "🧮 Calc Model - Scenario Comparison".bold().green());
    println!("   Export: {}", export_dir.display());
    println!(
        "   Scenarios: {}\n",
        selected.join(", ").bright_yellow().bold()
    );

    let mut results: Vec<(String, ResultMap)> = Vec::new();
    for name in &selected {
        let output = run_calculation(&available[name], &export_dir)?;
        results.push((name.clone(), output.cells));
    }

    // Without --cells, show the qualified keys that differ between scenarios
    let rows: Vec<String> = if cells.is_empty() {
        differing_keys(&results)
    } else {
        cells
    };

    let width = 24 + selected.len() * 15;
    println!("{}", "📊 Scenario Comparison:".bold().cyan());
    println!("{}", "─".repeat(width));
    print!("{:<24}", "Cell".bold());
    for name in &selected {
        print!("{:>15}", name.bright_yellow().bold());
    }
    println!();
    println!("{}", "─".repeat(width));

    for key in &rows {
        print!("{:<24}", key.bright_blue());
        for (_, cells) in &results {
            match cells.get(key) {
                Some(value) => print!("{:>15}", format_value(value).green()),
                None => print!("{:>15}", "-".dimmed()),
            }
        }
        println!();
    }

    println!("{}", "─".repeat(width));
    if rows.is_empty() {
        println!("   No differences");
    }
    println!("\n{}", "✅ Comparison complete".bold().green());

    Ok(())
}

/// Qualified keys whose value is not the same in every result.
fn differing_keys(results: &[(String, ResultMap)]) -> Vec<String> {
    let mut keys: Vec<&String> = results
        .iter()
        .flat_map(|(_, cells)| cells.keys())
        .filter(|k| k.contains('!'))
        .collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|key| {
            let mut values = results.iter().map(|(_, cells)| cells.get(key.as_str()));
            let first = values.next().flatten();
            values.any(|v| v != first)
        })
        .cloned()
        .collect()
}

/// Execute the watch command
pub fn watch(export_dir: PathBuf, options: RunOptions) -> CalcResult<()> {
    println!("{}", "👁️  Calc Model - Watch Mode".bold().green());
    println!("   Watching: {}", export_dir.display());
    println!("   Press {} to stop\n", "Ctrl+C".bold().yellow());

    if !export_dir.is_dir() {
        return Err(CalcError::Validation(format!(
            "Export directory not found: {}",
            export_dir.display()
        )));
    }

    let (tx, rx) = channel();

    // Debounce so a re-export of many sheet files triggers one run
    let mut debouncer = new_debouncer(Duration::from_millis(300), tx)
        .map_err(|e| CalcError::Validation(format!("Failed to create file watcher: {}", e)))?;

    debouncer
        .watcher()
        .watch(&export_dir, RecursiveMode::NonRecursive)
        .map_err(|e| CalcError::Validation(format!("Failed to watch directory: {}", e)))?;

    if let Some(ref inputs_file) = options.inputs_file {
        if let Some(parent) = inputs_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            debouncer
                .watcher()
                .watch(parent, RecursiveMode::NonRecursive)
                .map_err(|e| CalcError::Validation(format!("Failed to watch inputs: {}", e)))?;
        }
    }

    println!("{}", "🔄 Initial run...".cyan());
    run_watch_action(&export_dir, &options);
    println!();

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let relevant = events.iter().any(|event| {
                    event.kind == DebouncedEventKind::Any && is_watched_file(&event.path)
                });

                if relevant {
                    if options.verbose {
                        print!("\x1B[2J\x1B[1;1H");
                    }
                    println!(
                        "\n{} {}",
                        "🔄 Change detected at".cyan(),
                        chrono::Local::now().format("%H:%M:%S").to_string().cyan()
                    );
                    run_watch_action(&export_dir, &options);
                    println!();
                }
            }
            Ok(Err(error)) => {
                eprintln!("{} Watch error: {}", "❌".red(), error);
            }
            Err(e) => {
                eprintln!("{} Channel error: {}", "❌".red(), e);
                break;
            }
        }
    }

    Ok(())
}

fn is_watched_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| matches!(ext, "json" | "yaml" | "yml"))
}

/// Inputs are re-read on every run so edits to the inputs file take effect.
fn run_watch_action(export_dir: &Path, options: &RunOptions) {
    let result = collect_overrides(&options.inputs, options.inputs_file.as_deref())
        .and_then(|overrides| run_internal(export_dir, &overrides, options));
    if let Err(e) = result {
        println!("{} {}", "❌ Run failed:".bold().red(), e);
    }
}

//==============================================================================
// Input helpers
//==============================================================================

/// Parse one `KEY=VALUE` flag. The last `=` separates key and value, so
/// quoted sheet names may contain `=`.
pub fn parse_input_flag(flag: &str) -> CalcResult<(String, f64)> {
    let (key, value) = flag.rsplit_once('=').ok_or_else(|| {
        CalcError::Parse(format!("Invalid input '{}': expected KEY=VALUE", flag))
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(CalcError::Parse(format!("Invalid input '{}': empty key", flag)));
    }
    let value = parse_decimal(value).ok_or_else(|| {
        CalcError::Parse(format!("Invalid input '{}': '{}' is not a number", flag, value))
    })?;
    Ok((key.to_string(), value))
}

/// Read a flat `CellKey -> number` map from a `.json`, `.yaml` or `.yml` file.
pub fn load_inputs_file(path: &Path) -> CalcResult<Overrides> {
    let content = fs::read_to_string(path)?;
    if is_yaml(path) {
        Ok(serde_yaml::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

/// Inputs file first, then flags; a flag wins for the same key.
pub fn collect_overrides(flags: &[String], inputs_file: Option<&Path>) -> CalcResult<Overrides> {
    let mut overrides = match inputs_file {
        Some(path) => load_inputs_file(path)?,
        None => Overrides::new(),
    };
    for flag in flags {
        let (key, value) = parse_input_flag(flag)?;
        overrides.insert(key, value);
    }
    Ok(overrides)
}

/// Read a `scenario -> {CellKey: number}` map from a JSON or YAML file.
pub fn load_scenarios(path: &Path) -> CalcResult<Scenarios> {
    let content = fs::read_to_string(path)?;
    let scenarios: Scenarios = if is_yaml(path) {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    if scenarios.is_empty() {
        return Err(CalcError::Validation(format!(
            "No scenarios defined in {}",
            path.display()
        )));
    }
    Ok(scenarios)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

/// Split qualified result keys into `sheet -> [(coordinate, value)]`, sheets
/// in first-seen key order. Bare keys duplicate the default sheet's
/// qualified keys and are skipped. Coordinates are sorted row-major.
pub fn group_by_sheet(cells: &ResultMap) -> Vec<(String, Vec<(Coordinate, &CellValue)>)> {
    let mut groups: Vec<(String, Vec<(Coordinate, &CellValue)>)> = Vec::new();

    for (key, value) in cells {
        let Some((sheet, coordinate)) = key.rsplit_once('!') else {
            continue;
        };
        let Some(coordinate) = Coordinate::parse(coordinate) else {
            continue;
        };
        match groups.iter_mut().find(|(name, _)| name == sheet) {
            Some((_, entries)) => entries.push((coordinate, value)),
            None => groups.push((sheet.to_string(), vec![(coordinate, value)])),
        }
    }

    for (_, entries) in &mut groups {
        entries.sort_by_key(|(c, _)| *c);
    }
    groups
}

fn format_value(value: &CellValue) -> String {
    match value {
        CellValue::Null => "null".dimmed().to_string(),
        CellValue::Text(_) => value.display().italic().to_string(),
        CellValue::Number(_) => value.display(),
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
