use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use ideagate_calibrate::{AnchorBuilder, PassDecisionEngine, PatternCatalog, PatternSelector};
use ideagate_common::{CriticScore, GateConfig, Pattern, Story, StoryDraft};
use ideagate_llm::{ChatBackend, HttpEmbeddingProvider, LlmCritic, OpenAiCompatibleBackend};
use ideagate_novelty::{NoveltyChecker, NoveltyIndex};
use ideagate_refine::score_panel;

use crate::cli::{Cli, Commands};
use crate::runtime::{build_call_log, load_patterns, load_records};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn find<'a>(patterns: &'a [Pattern], id: &str) -> Result<&'a Pattern> {
    patterns
        .iter()
        .find(|p| p.id == id)
        .with_context(|| format!("unknown pattern '{id}'"))
}

pub async fn run(cli: Cli, config: GateConfig) -> Result<()> {
    let patterns_path = cli.patterns.as_deref();
    match cli.command {
        Commands::Novelty { idea } => novelty(&config, cli.records.as_deref(), &idea).await,
        Commands::Verdict { pattern, scores } => verdict(&config, patterns_path, &pattern, &scores),
        Commands::Anchors { pattern, global } => anchors(&config, patterns_path, pattern.as_deref(), global),
        Commands::Select => select(&config, patterns_path),
        Commands::Score { story, pattern } => score(&config, patterns_path, &story, &pattern).await,
    }
}

async fn novelty(config: &GateConfig, records: Option<&Path>, idea: &str) -> Result<()> {
    let index = NoveltyIndex::from_records(load_records(config, records)?)?;
    let provider = HttpEmbeddingProvider::from_config(&config.provider, &config.logging)?
        .with_call_log(build_call_log(&config.logging));
    let checker = NoveltyChecker::new(Arc::new(provider), Arc::new(index), &config.novelty);
    let report = checker.check(idea).await?;
    if report.is_degraded() {
        warn!(reason = report.unavailable_reason.as_deref().unwrap_or(""), "Novelty report is degraded");
    }
    print_json(&report)
}

fn verdict(config: &GateConfig, patterns: Option<&Path>, pattern_id: &str, scores: &[f64]) -> Result<()> {
    let patterns = load_patterns(config, patterns)?;
    let pattern = find(&patterns, pattern_id)?;
    let engine = PassDecisionEngine::new(config, &patterns)?;
    let scores: Vec<CriticScore> = scores
        .iter()
        .enumerate()
        .map(|(i, &raw)| CriticScore::new(format!("critic-{}", i + 1), raw, ""))
        .collect();
    print_json(&engine.evaluate(pattern, &scores))
}

fn anchors(config: &GateConfig, patterns: Option<&Path>, pattern_id: Option<&str>, global: bool) -> Result<()> {
    let patterns = load_patterns(config, patterns)?;
    let builder = AnchorBuilder::new(&config.calibration, config.pass.min_pattern_papers);
    let set = match (pattern_id, global) {
        (_, true) => builder.build_global(&patterns)?,
        (Some(id), false) => builder.build(find(&patterns, id)?)?,
        (None, false) => bail!("pass --pattern <id> or --global"),
    };
    print_json(&set)
}

fn select(config: &GateConfig, patterns: Option<&Path>) -> Result<()> {
    let patterns = load_patterns(config, patterns)?;
    print_json(&PatternSelector::new(&config.selection).select(&patterns))
}

async fn score(config: &GateConfig, patterns: Option<&Path>, story_path: &Path, pattern_id: &str) -> Result<()> {
    let patterns = load_patterns(config, patterns)?;
    let engine = PassDecisionEngine::new(config, &patterns)?;
    let catalog = PatternCatalog::new(patterns);
    let pattern = catalog
        .get(pattern_id)
        .with_context(|| format!("unknown pattern '{pattern_id}'"))?;

    let story: Story = serde_json::from_str(
        &std::fs::read_to_string(story_path).with_context(|| format!("reading {}", story_path.display()))?,
    )?;
    let draft = StoryDraft::new(story, pattern_id);

    let backend: Arc<dyn ChatBackend> = Arc::new(
        OpenAiCompatibleBackend::from_config(&config.provider, &config.logging)?
            .with_call_log(build_call_log(&config.logging)),
    );
    let critics = LlmCritic::panel(backend, &config.critic);
    let scores = score_panel(&critics, &draft, pattern).await?;
    info!(n = scores.len(), "Critic panel finished");
    print_json(&engine.evaluate(pattern, &scores))
}
