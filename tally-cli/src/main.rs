use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tally_categorise::{Categoriser, PromptLibrary, RuleSet, RuleSummary, assign_rules, load_rules};
use tally_ingest::{read_transactions_csv, write_transactions_csv};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod llm;
mod state;

use config::Config;
use llm::ModelClient;

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Categorise bank transactions with rules and a language model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default ~/.tally/config.toml
    Init,

    /// Apply the rule file to a statement and print how many rows each rule took
    Rules {
        #[arg(long)]
        input: PathBuf,

        /// Rule file (TOML or JSON); defaults to [data].rules_path
        #[arg(long)]
        rules: Option<PathBuf>,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Categorise a statement and write the result as CSV
    Categorise {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Rule file (TOML or JSON); defaults to [data].rules_path
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Ask the configured model after the rules have run
        #[arg(long)]
        ai: bool,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Model calls still in flight when a run fails are abandoned after this long.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    block_on_bounded(run(cli), SHUTDOWN_GRACE)?
}

/// Drive `fut` on a fresh multi-threaded runtime, then wait at most `grace`
/// for blocking work it left behind instead of the runtime's unbounded drop.
fn block_on_bounded<F: Future>(fut: F, grace: Duration) -> Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    let out = runtime.block_on(fut);
    runtime.shutdown_timeout(grace);
    Ok(out)
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init => {
            config::init_config()?;
        }

        Command::Rules {
            input,
            rules,
            config: config_file,
        } => {
            let cfg = config::load_config(config_file.as_deref())?;
            let Some(rules) = rule_set(rules.as_deref(), &cfg)? else {
                bail!("no rule file (pass --rules <file> or set [data].rules_path)");
            };
            let mut set = read_transactions_csv(&input)?;
            let summary = assign_rules(&mut set, &rules);
            println!("Read {} transactions from {}\n", set.len(), input.display());
            print_summary(&summary);
        }

        Command::Categorise {
            input,
            output,
            rules,
            ai,
            config: config_file,
        } => {
            let cfg = config::load_config(config_file.as_deref())?;
            let rules = rule_set(rules.as_deref(), &cfg)?;
            if rules.is_none() && !ai {
                bail!("nothing to do: pass --rules <file>, set [data].rules_path, or use --ai");
            }

            let mut set = read_transactions_csv(&input)?;
            println!("Read {} transactions from {}", set.len(), input.display());

            if let Some(rules) = &rules {
                let summary = assign_rules(&mut set, rules);
                print_summary(&summary);
            }

            if ai {
                let prompts = match &cfg.data.prompts_path {
                    Some(p) => PromptLibrary::load(p)
                        .with_context(|| format!("load prompts {}", p.display()))?,
                    None => PromptLibrary::default(),
                };
                let client = ModelClient::from_config(&cfg.model)?;
                info!(provider = ?client.provider(), model = %cfg.model.model, "model configured");
                let categoriser = Categoriser::with_prompts(
                    Arc::new(client),
                    cfg.data.context(),
                    cfg.categorise.to_config()?,
                    &prompts,
                )?;
                set = categoriser
                    .categorise(set)
                    .await
                    .context("model categorisation failed; no output written")?;
            }

            write_transactions_csv(&set, &output)?;
            println!("Wrote {} rows to {}", set.len(), output.display());
        }
    }

    Ok(())
}

/// `--rules` wins over the configured path; neither means no rule stage.
fn rule_set(flag: Option<&Path>, cfg: &Config) -> Result<Option<RuleSet>> {
    let Some(path) = flag.or(cfg.data.rules_path.as_deref()) else {
        return Ok(None);
    };
    let rules = load_rules(path).with_context(|| format!("load rules {}", path.display()))?;
    let set = RuleSet::compile(rules).with_context(|| format!("compile rules {}", path.display()))?;
    if set.is_empty() {
        warn!(path = %path.display(), "rule file has no rules; every row will be unassigned");
    }
    info!(rules = set.len(), path = %path.display(), "rules loaded");
    Ok(Some(set))
}

fn print_summary(summary: &RuleSummary) {
    for (rule, matched) in &summary.per_rule {
        println!("{matched:>6}  {rule}");
    }
    println!(
        "\nCategorised {} rows, {} unassigned",
        summary.categorised, summary.unassigned
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Instant;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_categorise_args() {
        let cli = Cli::try_parse_from([
            "tally",
            "categorise",
            "--input",
            "in.csv",
            "--output",
            "out.csv",
            "--ai",
        ])
        .unwrap();
        match cli.command {
            Command::Categorise { input, output, rules, ai, config } => {
                assert_eq!(input, PathBuf::from("in.csv"));
                assert_eq!(output, PathBuf::from("out.csv"));
                assert!(rules.is_none());
                assert!(ai);
                assert!(config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_failed_run_does_not_wait_for_stranded_calls() {
        let started = Instant::now();
        let out: Result<()> = block_on_bounded(
            async {
                // A model call that outlives the failed run
                drop(tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(10))));
                bail!("batch 0-19 failed")
            },
            Duration::from_millis(50),
        )
        .unwrap();
        assert!(out.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_empty_rule_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "").unwrap();
        let set = rule_set(Some(&path), &Config::default()).unwrap().unwrap();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_no_rule_file_means_no_rule_stage() {
        assert!(rule_set(None, &Config::default()).unwrap().is_none());
    }
}
