use anyhow::{Context, Result};
use cardlog::cli::{Cli, OutputFormat};
use cardlog::pipeline::{self, RunOptions};
use cardlog::report;
use cardlog::variant::{self, Averaging, VariantSet};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `--debug` forces TRACE, otherwise RUST_LOG or warn
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print the known variants, one per line
fn print_variants(variants: &VariantSet) {
    for v in variants.iter() {
        let averaging = match v.averaging {
            Averaging::Observed => "observed".to_string(),
            Averaging::Fixed(n) => format!("fixed /{}", n),
        };
        println!(
            "{:<20} {:?} protocol={} scope={} averaging={} file={}",
            v.name,
            v.phase,
            v.protocol_codes.join(","),
            v.command_scope.as_deref().unwrap_or("*"),
            averaging,
            v.file_template
        );
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let variants = match &args.config {
        Some(path) => VariantSet::with_file(path)?,
        None => VariantSet::builtin(),
    };

    if args.list_variants {
        print_variants(&variants);
        return Ok(());
    }

    let mut selected = variants.get(&args.variant)?.clone();
    if let Some(spec) = &args.settings {
        selected.settings = variant::parse_settings(spec)?;
    }
    if let Some(ratio) = args.ratio {
        selected.ratio = ratio;
    }
    if let Some(platform) = args.platform {
        selected.platform = platform;
    }

    let options = RunOptions {
        dir: args.dir,
        skip_missing: args.skip_missing,
    };
    let result = pipeline::run_variant(&selected, &options)
        .with_context(|| format!("Failed to process variant '{}'", selected.name))?;

    match args.format {
        OutputFormat::Text => print!("{}", report::render_text(&result, args.by_command)),
        OutputFormat::Json => println!(
            "{}",
            report::render_json(&result, args.by_command).context("Failed to encode JSON")?
        ),
    }

    Ok(())
}
