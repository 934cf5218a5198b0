use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use jelly_migrator::{init_telemetry, MigrationReport, Migrator, MigratorConfig};

#[derive(Parser)]
#[command(name = "jelly-migrator")]
#[command(about = "Rename `class` to `clazz` on Stapler include tags in committed Jelly files")]
#[command(long_about = "Walks the Jelly files recorded by the HEAD commit of a git working copy and, \
                       in every file whose root element declares the jelly:stapler namespace, renames \
                       the `class` attribute of <st:include> tags to `clazz`. Files are rewritten in \
                       place, atomically, and only when something changed.")]
struct Cli {
    /// Root of the git working copy to migrate
    #[arg(help = "Root of a git working copy; its HEAD commit selects the files to migrate")]
    target: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = MigratorConfig::load_env_file();
    let config = MigratorConfig::load()?;
    init_telemetry(&config.observability)?;

    let report = Migrator::default().run(&cli.target)?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &MigrationReport) {
    println!();
    println!(
        "Migrated {} of {} Jelly files ({} attributes renamed)",
        report.rewritten, report.scanned, report.renamed_attributes
    );
    if report.unparseable > 0 {
        println!(
            "{} file(s) could not be parsed and were left unchanged",
            report.unparseable
        );
    }
}
