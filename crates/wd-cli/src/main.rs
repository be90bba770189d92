//! Warden CLI
//!
//! Compiles filter lists into declarative rule JSON, answers cosmetic and
//! request queries against a compiled set, and refreshes subscribed lists
//! into a persistent rule-set store.

mod fetch;
mod sources;
mod store;

use std::collections::BTreeSet;
use std::fs;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};

use wd_compiler::{
    compile, CompileDiagnostics, CompileInput, CustomRule, CustomRuleKind,
    GateOutcome, ListFormat, MemoryBackend, RuleSetManager, WardenConfig,
};
use wd_core::declarative::DeclarativeRule;
use wd_core::ids::IdSpace;
use wd_core::{Category, MatchDecision, RequestContext, ResourceType, RuleMatcher};

use crate::sources::{load_local_lists, ListSource};
use crate::store::JsonFileStore;

#[derive(Parser)]
#[command(name = "wd-cli")]
#[command(about = "Warden filter list compiler and tools")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Adblock,
    Hosts,
}

impl From<FormatArg> for ListFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Adblock => ListFormat::Adblock,
            FormatArg::Hosts => ListFormat::Hosts,
        }
    }
}

#[derive(clap::Args)]
struct RuleArgs {
    /// Input lists as `[category=]path`
    #[arg(short, long, required = true)]
    input: Vec<String>,

    /// Force a list format instead of detecting it
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Enabled categories (default: all built-in categories)
    #[arg(short, long, value_delimiter = ',')]
    enable: Vec<String>,

    /// Custom block rules
    #[arg(long)]
    block: Vec<String>,

    /// Custom allow rules
    #[arg(long)]
    allow: Vec<String>,

    /// Sites whose requests are never filtered
    #[arg(long)]
    whitelist: Vec<String>,

    /// Domains always blocked
    #[arg(long)]
    blacklist: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile filter lists into declarative rule JSON
    Compile {
        #[command(flatten)]
        rules: RuleArgs,

        /// Output rule file
        #[arg(short, long, default_value = "rules.json")]
        output: String,
    },

    /// Print the cosmetic selectors that apply to a domain
    Cosmetics {
        #[command(flatten)]
        rules: RuleArgs,

        /// Page domain
        #[arg(short, long)]
        domain: String,
    },

    /// Evaluate a request against a compiled rule file
    Check {
        /// Rule file written by `compile`
        #[arg(short, long)]
        rules: String,

        /// Request URL
        #[arg(short, long)]
        url: String,

        /// Resource type (script, image, sub_frame, ...)
        #[arg(short = 't', long = "type", default_value = "other")]
        resource_type: String,

        /// Initiator origin
        #[arg(long)]
        initiator: Option<String>,
    },

    /// Refresh subscribed lists into a rule-set store and recompile
    Fetch {
        /// Sources as `[category=]url`
        #[arg(short, long)]
        source: Vec<String>,

        /// Rule-set store file
        #[arg(long, default_value = "warden-state.json")]
        store: String,

        /// Output rule file
        #[arg(short, long)]
        output: Option<String>,

        /// Force a list format instead of detecting it
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Compile { rules, output } => cmd_compile(&config, &rules, &output, cli.verbose),
        Commands::Cosmetics { rules, domain } => cmd_cosmetics(&config, &rules, &domain),
        Commands::Check {
            rules,
            url,
            resource_type,
            initiator,
        } => cmd_check(&config, &rules, &url, &resource_type, initiator.as_deref()),
        Commands::Fetch {
            source,
            store,
            output,
            format,
            timeout,
        } => cmd_fetch(
            &config,
            &source,
            &store,
            output.as_deref(),
            format.map(ListFormat::from),
            Duration::from_secs(timeout),
        ),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> Result<WardenConfig, String> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
            WardenConfig::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path, e))
        }
        None => Ok(WardenConfig::default()),
    }
}

fn enabled_categories(names: &[String]) -> Result<BTreeSet<Category>, String> {
    if names.is_empty() {
        return Ok(Category::ALL.into_iter().filter(Category::is_toggleable).collect());
    }
    names
        .iter()
        .map(|name| name.parse::<Category>().map_err(|e| e.to_string()))
        .collect()
}

fn custom_rules(rules: &RuleArgs) -> Vec<CustomRule> {
    let blocks = rules.block.iter().map(|p| (p, CustomRuleKind::Block));
    let allows = rules.allow.iter().map(|p| (p, CustomRuleKind::Allow));
    blocks
        .chain(allows)
        .enumerate()
        .map(|(i, (pattern, kind))| CustomRule::new(i as u64 + 1, pattern.as_str(), kind, 0))
        .collect()
}

fn compile_args(
    config: &WardenConfig,
    rules: &RuleArgs,
    verbose: bool,
) -> Result<(wd_compiler::Compilation, usize), String> {
    let lists = load_local_lists(&rules.input, rules.format.map(ListFormat::from), verbose)?;
    let custom = custom_rules(rules);
    let input = CompileInput {
        lists: lists.iter().collect(),
        custom_rules: &custom,
        whitelist: &rules.whitelist,
        blacklist: &rules.blacklist,
        enabled_categories: enabled_categories(&rules.enable)?,
        rule_budget: Some(config.sync.max_rules),
    };
    let compilation = compile(&input, &config.compiler).map_err(|e| e.to_string())?;
    let total_lines = lists.iter().map(|l| l.meta.raw_rule_count).sum();
    Ok((compilation, total_lines))
}

fn write_rules(path: &str, rules: &[wd_core::CompiledRule]) -> Result<usize, String> {
    let declarative: Vec<DeclarativeRule> = rules.iter().map(DeclarativeRule::from).collect();
    let json = serde_json::to_string_pretty(&declarative).map_err(|e| format!("Failed to encode rules: {}", e))?;
    fs::write(path, &json).map_err(|e| format!("Failed to write '{}': {}", path, e))?;
    Ok(json.len())
}

fn print_diagnostics(diagnostics: &CompileDiagnostics) {
    println!("  Skipped:  {} lines", diagnostics.parse_skipped);
    println!(
        "  Removed:  {} duplicates, {} badfiltered, {} invalid",
        diagnostics.duplicates_removed, diagnostics.badfiltered, diagnostics.rejected_rules
    );
    for (category, count) in &diagnostics.rules_per_category {
        println!("  {:<12} {} rules", format!("{}:", category), count);
    }
    for exhausted in &diagnostics.range_exhausted {
        println!(
            "  WARNING:  '{}' id range ({} ids) exhausted, {} rules dropped",
            exhausted.category, exhausted.width, exhausted.dropped
        );
    }
    if diagnostics.capacity_dropped > 0 {
        println!(
            "  WARNING:  rule ceiling of {} reached, {} list rules dropped",
            diagnostics.list_ceiling, diagnostics.capacity_dropped
        );
        for (list, count) in &diagnostics.rules_per_list {
            println!("  {:<12} {} rules kept", list, count);
        }
    }
    if !diagnostics.stale_lists.is_empty() {
        println!("  Stale:    {}", diagnostics.stale_lists.join(", "));
    }
}

fn cmd_compile(config: &WardenConfig, rules: &RuleArgs, output: &str, verbose: bool) -> Result<(), String> {
    let start = Instant::now();
    let (compilation, total_lines) = compile_args(config, rules, verbose)?;

    if compilation.rules.len() > config.sync.max_rules {
        log::warn!(
            "{} rules exceed the backend limit of {}",
            compilation.rules.len(),
            config.sync.max_rules
        );
    }

    let size = write_rules(output, &compilation.rules)?;
    let total_time = start.elapsed();

    println!("Compiled {} filter lists to '{}'", rules.input.len(), output);
    println!("  Lines:    {}", total_lines);
    println!(
        "  Rules:    {} network, {} cosmetic",
        compilation.rules.len(),
        compilation.diagnostics.cosmetic_rules
    );
    print_diagnostics(&compilation.diagnostics);
    println!("  Size:     {} bytes ({:.1} KB)", size, size as f64 / 1024.0);
    println!("  Time:     {:.1}ms", total_time.as_secs_f64() * 1000.0);

    Ok(())
}

fn cmd_cosmetics(config: &WardenConfig, rules: &RuleArgs, domain: &str) -> Result<(), String> {
    let (compilation, _) = compile_args(config, rules, false)?;

    for selector in compilation.cosmetics.cosmetics_for(domain) {
        println!("{}", selector);
    }
    for script in compilation.cosmetics.scriptlets_for(domain) {
        println!("+js({})", script);
    }

    Ok(())
}

fn cmd_check(
    config: &WardenConfig,
    rules_path: &str,
    url: &str,
    resource_type: &str,
    initiator: Option<&str>,
) -> Result<(), String> {
    let text = fs::read_to_string(rules_path).map_err(|e| format!("Failed to read '{}': {}", rules_path, e))?;
    let declarative: Vec<DeclarativeRule> =
        serde_json::from_str(&text).map_err(|e| format!("Invalid rule file '{}': {}", rules_path, e))?;

    let space: &IdSpace = &config.compiler.id_ranges;
    let rules: Vec<_> = declarative.into_iter().map(|r| r.into_compiled(space)).collect();
    let matcher = RuleMatcher::new(&rules);
    if !matcher.rejected_ids().is_empty() {
        log::warn!("{} rules could not be loaded", matcher.rejected_ids().len());
    }

    let result = matcher.match_request(&RequestContext {
        url,
        resource_type: ResourceType::from_request(resource_type),
        initiator,
    });

    let decision = match result.decision {
        MatchDecision::Allow => "ALLOW",
        MatchDecision::Block => "BLOCK",
    };
    match result.rule_id {
        Some(id) => {
            let category = space
                .category_of(id)
                .map_or_else(|| "unknown".to_string(), |c| c.to_string());
            println!("{} (rule {}, priority {}, {})", decision, id, result.priority, category);
        }
        None => println!("{} (no matching rule)", decision),
    }

    Ok(())
}

fn cmd_fetch(
    config: &WardenConfig,
    sources: &[String],
    store_path: &str,
    output: Option<&str>,
    format: Option<ListFormat>,
    timeout: Duration,
) -> Result<(), String> {
    let mut store = JsonFileStore::open(store_path).map_err(|e| e.to_string())?;
    let backend = MemoryBackend::new(config.sync);
    let manager = RuleSetManager::load_from(config.compiler.clone(), backend, &store).map_err(|e| e.to_string())?;

    let mut sources = sources
        .iter()
        .map(|spec| ListSource::parse(spec))
        .collect::<Result<Vec<_>, _>>()?;
    if sources.is_empty() {
        // Refresh every list already in the store.
        sources = manager
            .lists()
            .into_iter()
            .map(|meta| ListSource {
                category: meta.category,
                location: meta.source_uri,
            })
            .collect();
    }
    if sources.is_empty() {
        return Err("No sources given and none stored".to_string());
    }

    let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start runtime: {}", e))?;
    let results = runtime.block_on(fetch::fetch_all(sources, format, timeout));

    for result in results {
        match result {
            Ok(fetched) => {
                println!(
                    "  fetched  {} - {} rules, {} skipped",
                    fetched.source.location,
                    fetched.list.rules.len(),
                    fetched.list.skipped
                );
                manager.insert_list(fetched.list);
            }
            Err(e) => {
                println!("  failed   {}", e);
                if let wd_core::RuleSetError::FetchFailed { list, reason } = &e {
                    manager.record_fetch_failure(list, reason);
                }
            }
        }
    }

    match manager.recompile() {
        GateOutcome::Ran(result) => {
            result.map_err(|e| e.to_string())?;
        }
        GateOutcome::Coalesced => {}
    }

    manager.save_to(&mut store).map_err(|e| e.to_string())?;

    let status = manager.status();
    println!("Store '{}': {} lists, {} active rules", store_path, status.lists.len(), status.active_rules);
    if let Some(diagnostics) = &status.diagnostics {
        print_diagnostics(diagnostics);
    }

    if let Some(output) = output {
        write_rules(output, &manager.compiled_rules())?;
        println!("Wrote rules to '{}'", output);
    }

    Ok(())
}
