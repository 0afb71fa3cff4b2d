//! referral-runner: headless runner for the referral classification pipeline.
//!
//! Usage:
//!   referral-runner --data-dir ./data --output-dir ./output --db runs.db
//!   referral-runner --config pipeline.json
//!   referral-runner --fixture-seed 7 --fixture-referrals 500 --data-dir /tmp/ref

use anyhow::{anyhow, Result};
use referral_core::{
    classifier::InvalidReason,
    config::PipelineConfig,
    engine::{PipelineEngine, RunReport},
    fixture,
    store::RunStore,
};
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = find_arg(&args, "--db").unwrap_or(":memory:");
    let fixture_seed: Option<u64> = parse_arg(&args, "--fixture-seed")?;
    let fixture_referrals: usize = parse_arg(&args, "--fixture-referrals")?.unwrap_or(200);

    let config = match find_arg(&args, "--config") {
        Some(path) => PipelineConfig::load(Path::new(path))?,
        None => PipelineConfig::for_dirs(
            find_arg(&args, "--data-dir").unwrap_or("./data"),
            find_arg(&args, "--output-dir").unwrap_or("./output"),
        ),
    };

    log::debug!("config: {config:?}");

    println!("Referral pipeline: referral-runner");
    println!("  data_dir:    {}", config.data_dir.display());
    println!("  output_dir:  {}", config.output_dir.display());
    println!("  db:          {db}");
    println!("  tz scope:    {:?}", config.timezone_scope);
    println!("  naive time:  {:?}", config.naive_time);
    println!();

    if let Some(seed) = fixture_seed {
        let sources = fixture::generate(seed, fixture_referrals);
        sources.write_all(&config)?;
        println!(
            "  wrote synthetic sources (seed {seed}, {fixture_referrals} referrals) to {}",
            config.data_dir.display()
        );
        println!();
    }

    let store = RunStore::open(db)?;
    store.migrate()?;

    let engine = PipelineEngine::build(config, store)?;
    let report = engine.run()?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    let s = &report.summary;
    let j = &report.join_stats;

    println!("=== RUN SUMMARY ===");
    println!("  run_id:            {}", report.run_id);
    println!("  referrals:         {}", s.total);
    println!("  valid:             {}", s.valid);
    println!("  invalid:           {}", s.invalid());
    println!("  reward eligible:   {}", s.reward_eligible);
    println!();
    println!("=== INVALID REASONS ===");
    for reason in [
        InvalidReason::NoTransaction,
        InvalidReason::TransactionNotPaid,
        InvalidReason::ReferrerDeleted,
        InvalidReason::TransactionBeforeReferral,
    ] {
        println!("  {:<28} {}", reason.code(), s.count_for(reason));
    }
    println!();
    println!("=== JOIN ===");
    println!("  transaction misses:   {}", j.transaction_misses);
    println!("  referrer misses:      {}", j.referrer_misses);
    println!("  lead misses:          {}", j.lead_misses);
    println!("  users collapsed:      {}", j.user_snapshots_collapsed);
    println!("  leads collapsed:      {}", j.lead_snapshots_collapsed);
    println!("  null local times:     {}", j.local_time_nulls);
    println!();
    println!("  joined: {}", report.joined_path.display());
    println!("  final:  {}", report.final_path.display());
}

fn find_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

/// `None` when the flag is absent; an error naming the flag when its value
/// does not parse.
fn parse_arg<T>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    find_arg(args, flag)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow!("invalid value {raw:?} for {flag}: {e}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn absent_flag_is_none() {
        let args = args("referral-runner --db runs.db");
        assert_eq!(parse_arg::<u64>(&args, "--fixture-seed").unwrap(), None);
    }

    #[test]
    fn numeric_flags_parse() {
        let args = args("referral-runner --fixture-seed 7 --fixture-referrals 500");
        assert_eq!(parse_arg::<u64>(&args, "--fixture-seed").unwrap(), Some(7));
        assert_eq!(parse_arg::<usize>(&args, "--fixture-referrals").unwrap(), Some(500));
    }

    #[test]
    fn bad_value_names_the_flag() {
        let args = args("referral-runner --fixture-seed abc --fixture-referrals -3");
        let err = parse_arg::<u64>(&args, "--fixture-seed").unwrap_err();
        assert!(err.to_string().contains("--fixture-seed"), "{err}");
        assert!(err.to_string().contains("\"abc\""), "{err}");
        assert!(parse_arg::<usize>(&args, "--fixture-referrals").is_err());
    }
}
