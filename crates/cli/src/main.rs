//! CLI for generating lab measurement report decks from instrument exports.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use labreport_core::{
    config::{unique_output_path, TemplateConfig},
    ForceUnit, GroupedData, ReportSchema,
};
use labreport_deck::{render_report, DeckPackage, RenderOptions};
use labreport_extract::curves::CurveKind;

/// Generate report slide decks from tensile, bend and hardness test data.
#[derive(Parser, Debug)]
#[command(name = "labreport")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a tensile report deck from a .docx or .xlsx summary
    Tensile(TensileArgs),
    /// Generate a VDA bend report deck from a .csv or .xlsx export
    Bend(BendArgs),
    /// Extract hardness mean±SD readings from a PDF report
    Hardness(HardnessArgs),
    /// Prepare curve data for the external plotting application
    Curves(CurvesArgs),
    /// Show or edit stored template paths
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
struct TensileArgs {
    /// Input summary file (.docx, .xlsx or .xls)
    input: PathBuf,

    /// Template deck (default: the configured tensile_deck)
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Output path (default: <input>_tensile_report.pptx, never overwritten)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Always remove the Ag column, even when Ag data is present
    #[arg(long)]
    no_ag: bool,

    /// Placeholder text replaced by the project identifier
    #[arg(long, default_value = "项目号")]
    placeholder: String,
}

#[derive(clap::Args, Debug)]
struct BendArgs {
    /// Input export file (.csv, .xlsx or .xls)
    input: PathBuf,

    /// Template deck (default: the configured vda_deck)
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Output path (default: <input>_bend_report.pptx, never overwritten)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Always remove the displacement column
    #[arg(long)]
    no_displacement: bool,

    /// Unit for the max-force column (source data is in newtons)
    #[arg(long, value_enum, default_value_t = UnitArg::Kn)]
    force_unit: UnitArg,

    /// Placeholder text replaced by the project identifier
    #[arg(long, default_value = "项目号")]
    placeholder: String,
}

#[derive(clap::Args, Debug)]
struct HardnessArgs {
    /// Input PDF report
    input: PathBuf,

    /// Decimal places for the mean±SD display
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    decimals: u8,
}

#[derive(clap::Args, Debug)]
struct CurvesArgs {
    /// Input workbook holding the raw curve sheet
    input: PathBuf,

    /// Which test produced the workbook
    #[arg(long, value_enum)]
    kind: CurveKindArg,

    /// Curves per graph when chunking into plot jobs
    #[arg(short, long, default_value_t = 8)]
    lines_per_graph: usize,

    /// Prepared CSV output (default: <input>_curves.csv, never overwritten)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print one stored value
    Get { key: String },
    /// Store a value
    Set { key: String, value: String },
    /// Print every key and value
    List,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum UnitArg {
    /// Kilonewtons (values scaled by 0.001)
    Kn,
    /// Newtons, as exported
    N,
}

impl From<UnitArg> for ForceUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Kn => ForceUnit::Kilonewton,
            UnitArg::N => ForceUnit::Newton,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CurveKindArg {
    Tensile,
    #[value(alias = "vda")]
    Bend,
}

impl From<CurveKindArg> for CurveKind {
    fn from(kind: CurveKindArg) -> Self {
        match kind {
            CurveKindArg::Tensile => CurveKind::Tensile,
            CurveKindArg::Bend => CurveKind::Bend,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    match cli.command {
        Command::Tensile(args) => run_tensile(args),
        Command::Bend(args) => run_bend(args),
        Command::Hardness(args) => run_hardness(args),
        Command::Curves(args) => run_curves(args),
        Command::Config(args) => run_config(args),
    }
}

fn run_tensile(args: TensileArgs) -> Result<()> {
    let data = labreport_extract::extract_tensile(&args.input)
        .with_context(|| format!("Failed to extract {}", args.input.display()))?;
    let schema = ReportSchema::tensile();
    let drop_optional = args.no_ag || !has_optional_data(&data, &schema);

    let template = resolve_template(args.template, "tensile_deck")?;
    let output = resolve_output(args.output, &args.input, "_tensile_report.pptx");
    generate_deck(
        &template,
        &output,
        &data,
        &schema,
        drop_optional,
        args.placeholder,
    )
}

fn run_bend(args: BendArgs) -> Result<()> {
    let data = labreport_extract::extract_bend(&args.input)
        .with_context(|| format!("Failed to extract {}", args.input.display()))?;
    let schema = ReportSchema::vda_bend(args.force_unit.into());
    let drop_optional = args.no_displacement || !has_optional_data(&data, &schema);

    let template = resolve_template(args.template, "vda_deck")?;
    let output = resolve_output(args.output, &args.input, "_bend_report.pptx");
    generate_deck(
        &template,
        &output,
        &data,
        &schema,
        drop_optional,
        args.placeholder,
    )
}

fn generate_deck(
    template: &Path,
    output: &Path,
    data: &GroupedData,
    schema: &ReportSchema,
    drop_optional: bool,
    placeholder: String,
) -> Result<()> {
    log::debug!("template deck: {}", template.display());
    let mut package = DeckPackage::open(template)
        .with_context(|| format!("Failed to open template {}", template.display()))?;
    let options = RenderOptions {
        placeholder,
        drop_optional,
        ..RenderOptions::default()
    };
    render_report(&mut package, data, schema, &options)?;
    package.save(output)?;

    let samples: usize = data.groups.iter().map(|g| g.len()).sum();
    println!(
        "Wrote {} ({} groups, {} samples)",
        output.display(),
        data.groups.len(),
        samples
    );
    Ok(())
}

fn run_hardness(args: HardnessArgs) -> Result<()> {
    let readings = labreport_extract::extract_hardness(&args.input)
        .with_context(|| format!("Failed to extract {}", args.input.display()))?;
    for reading in &readings {
        println!("{}: {}", reading.id, reading.display(args.decimals));
    }
    Ok(())
}

fn run_curves(args: CurvesArgs) -> Result<()> {
    let dataset = labreport_extract::curves::load_curves(&args.input, args.kind.into())
        .with_context(|| format!("Failed to read curves from {}", args.input.display()))?;

    let output = resolve_output(args.output, &args.input, "_curves.csv");
    std::fs::write(&output, dataset.to_csv())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} ({} columns)", output.display(), dataset.column_count());

    for (i, job) in dataset.plot_jobs(args.lines_per_graph).iter().enumerate() {
        let series: Vec<&str> = job
            .pairs
            .iter()
            .filter_map(|pair| dataset.headers.get(pair.y).map(String::as_str))
            .collect();
        println!("graph {}: {}", i + 1, series.join(", "));
    }
    Ok(())
}

fn run_config(args: ConfigArgs) -> Result<()> {
    let mut config = TemplateConfig::load()?;
    match args.action {
        ConfigAction::Get { key } => println!("{}", config.get(&key)),
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} = {}", key, value);
        }
        ConfigAction::List => {
            for (key, value) in config.entries() {
                println!("{} = {}", key, value);
            }
        }
    }
    Ok(())
}

/// The template deck: an explicit flag wins, otherwise the configured path.
fn resolve_template(flag: Option<PathBuf>, config_key: &str) -> Result<PathBuf> {
    if let Some(path) = flag {
        if !path.exists() {
            bail!("Template {} does not exist", path.display());
        }
        return Ok(path);
    }
    let config = TemplateConfig::load()?;
    match config.template_path(config_key) {
        Some(path) => Ok(path),
        None => bail!(
            "No template deck configured; pass --template or run `labreport config set {} <path>`",
            config_key
        ),
    }
}

/// The output path: an explicit flag is taken as-is, the derived default is
/// made unique so an existing report is never overwritten.
fn resolve_output(flag: Option<PathBuf>, input: &Path, suffix: &str) -> PathBuf {
    match flag {
        Some(path) => path,
        None => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output");
            let name = format!("{}{}", stem, suffix);
            let default = match input.parent() {
                Some(parent) => parent.join(name),
                None => PathBuf::from(name),
            };
            unique_output_path(&default)
        }
    }
}

/// Whether any record carries a numeric value in the schema's optional field.
fn has_optional_data(data: &GroupedData, schema: &ReportSchema) -> bool {
    let Some(index) = schema.fields.iter().position(|f| f.optional) else {
        return true;
    };
    data.groups
        .iter()
        .flat_map(|g| &g.records)
        .any(|r| r.values.get(index).and_then(|v| v.as_number()).is_some())
}
