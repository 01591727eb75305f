use std::{
    env,
    ffi::{OsStr, OsString},
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser};
use console::style;
use gmm_core::{
    align_units, parse_pairs_strict, reconstruct, Category, Config, DiffKind, DiffUnit,
    EditorSurface, HandoffPayload, HandoffStore, HighlightOutcome, HighlightStyle, OverlayLayer,
    PipelineError, Session, SurfaceMetrics,
};

/// MailGrader CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "gmm",
    about = "Grade a draft for fluff, spam phrasing, and hard-to-read prose."
)]
struct Args {
    /// Path to config file (YAML).
    #[arg(long, default_value = "grademail.yml")]
    config: PathBuf,

    /// Override the companion server base URL.
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Draft to grade; reads stdin when omitted.
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Wrap width in columns for highlight geometry (defaults to the terminal).
    #[arg(long, value_name = "COLS")]
    width: Option<usize>,

    /// Skip the paced reveal and report findings immediately.
    #[arg(long, action = ArgAction::SetTrue)]
    no_pace: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "gmm fix",
    about = "Fetch rewrites for the flagged spans and show the comparison."
)]
struct FixArgs {
    /// Path to config file (YAML).
    #[arg(long, default_value = "grademail.yml")]
    config: PathBuf,

    /// Override the companion server base URL.
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Read tagged content from a file instead of the hand-off store.
    #[arg(long, value_name = "PATH")]
    tagged: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let argv: Vec<OsString> = env::args_os().collect();
    if argv.len() > 1 && argv[1].as_os_str() == OsStr::new("fix") {
        let mut forwarded = Vec::with_capacity(argv.len() - 1);
        forwarded.push(argv[0].clone());
        forwarded.extend_from_slice(&argv[2..]);
        let fix_args = FixArgs::parse_from(forwarded);
        return run_fix(fix_args).await;
    }

    let args = Args::parse();
    run_grade(args).await
}

async fn run_grade(args: Args) -> anyhow::Result<()> {
    let mut config = Config::load_or_default(&args.config)?;
    if let Some(server) = args.server {
        config.services.base_url = server;
    }
    if args.no_pace {
        config.timings.queue_delay_ms = 0;
        config.timings.animation_duration_ms = 0;
    }

    let text = read_input(args.path.as_deref())?;
    if !gmm_core::should_analyze(&text) {
        return Ok(());
    }

    let columns = args.width.unwrap_or_else(|| {
        let (_, cols) = console::Term::stdout().size();
        (cols as usize).max(20)
    });
    let metrics = SurfaceMetrics {
        wrap_columns: columns,
        ..SurfaceMetrics::default()
    };
    let surface = EditorSurface::from_text(&text, metrics)?;
    let mut overlay = OverlayLayer::attach(&surface)?;
    let mut session = Session::new(config.clone());

    println!(
        "{} {}",
        style("Grading").cyan().bold(),
        describe_source(args.path.as_deref())
    );

    session.begin_stream();
    let client = reqwest::Client::new();
    let url = format!("{}/api/analyze", config.services.base_url);
    let request = client
        .post(&url)
        .json(&serde_json::json!({ "message": text }))
        .send()
        .await;

    // Analysis is a best-effort enhancement: a failed request is logged
    // and the command exits quietly rather than erroring at the user.
    let mut streamed = false;
    match request {
        Ok(mut response) if response.status().is_success() => {
            streamed = true;
            let mut decoder = Utf8Accumulator::default();
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => {
                        let piece = decoder.push(&chunk);
                        if !piece.is_empty() {
                            session.ingest_chunk(&piece);
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        tracing::warn!(%error, "analysis stream ended early");
                        break;
                    }
                }
            }
        }
        Ok(response) => {
            tracing::warn!(status = %response.status(), "analyzer returned an error");
        }
        Err(error) => {
            tracing::warn!(%error, "analyzer request failed");
        }
    }
    session.finish_stream();
    if !streamed {
        return Ok(());
    }

    while let Some(outcome) = session.drain_next(&surface, &mut overlay).await {
        print_outcome(&outcome);
    }
    if session.legend_visible {
        print_legend();
    }

    if session.fix_available {
        let payload = HandoffPayload {
            full_original_text: Some(text.clone()),
            tagged_content: gmm_core::rewrap(session.tagged_response()),
            ..HandoffPayload::default()
        };
        let mut store = HandoffStore::new(&config.handoff);
        park_payload(&client, &config, &mut store, payload).await?;
        println!(
            "\n{} run {} to see suggested rewrites",
            style("Fixes available:").green().bold(),
            style("gmm fix").bold()
        );
    } else {
        println!("{}", style("No problems flagged.").green());
    }
    Ok(())
}

/// Saves the grading result for the fix view: locally when it fits the
/// size budget, otherwise parked server-side with only the id stored.
async fn park_payload(
    client: &reqwest::Client,
    config: &Config,
    store: &mut HandoffStore,
    payload: HandoffPayload,
) -> anyhow::Result<()> {
    let json = serde_json::to_value(&payload)?;
    let size = json.to_string().len();
    if size > config.services.handoff_size_budget {
        let url = format!("{}/api/store", config.services.base_url);
        let response = client
            .post(&url)
            .json(&serde_json::json!({ "payload": json }))
            .send()
            .await;
        if let Ok(response) = response {
            if response.status().is_success() {
                let body: serde_json::Value = response.json().await?;
                if let Some(id) = body.get("id").and_then(|v| v.as_str()) {
                    store.store_payload(&HandoffPayload {
                        store_id: Some(id.to_string()),
                        ..HandoffPayload::default()
                    })?;
                    return Ok(());
                }
            }
        }
        tracing::warn!("server-side hand-off failed, storing the payload locally");
    }
    store.store_payload(&payload)?;
    Ok(())
}

async fn run_fix(args: FixArgs) -> anyhow::Result<()> {
    let mut config = Config::load_or_default(&args.config)?;
    if let Some(server) = args.server {
        config.services.base_url = server;
    }
    let mut store = HandoffStore::new(&config.handoff);
    let client = reqwest::Client::new();

    let payload = if let Some(path) = &args.tagged {
        HandoffPayload {
            tagged_content: fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            ..HandoffPayload::default()
        }
    } else {
        match store.load_payload() {
            Some(payload) => payload,
            None => {
                eprintln!(
                    "{}",
                    style("No content to fix. Run `gmm grade` first.").red().bold()
                );
                bail!("missing hand-off payload");
            }
        }
    };
    let payload = resolve_store_reference(&client, &config, payload).await?;
    if payload.tagged_content.trim().is_empty() {
        eprintln!(
            "{}",
            style("No content to fix. Run `gmm grade` first.").red().bold()
        );
        bail!("empty hand-off payload");
    }

    println!("{}", style("Improving your content...").cyan());
    let url = format!("{}/api/fix", config.services.base_url);
    let request = client
        .post(&url)
        .json(&serde_json::json!({ "message": payload.tagged_content }))
        .send()
        .await;

    let mut body = String::new();
    match request {
        Ok(mut response) if response.status().is_success() => {
            let mut decoder = Utf8Accumulator::default();
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => body.push_str(&decoder.push(&chunk)),
                    Ok(None) => break,
                    Err(error) => {
                        render_fix_error(&format!("the response stream failed: {error}"));
                        bail!("fixer stream failed");
                    }
                }
            }
        }
        Ok(response) => {
            render_fix_error(&format!("the server returned {}", response.status()));
            bail!("fixer request failed");
        }
        Err(error) => {
            render_fix_error(&error.to_string());
            bail!("fixer request failed");
        }
    }

    let pairs = match parse_pairs_strict(&body) {
        Ok(pairs) => pairs,
        // Distinct from a network failure: nothing extractable usually
        // means the content is already in decent shape.
        Err(PipelineError::NoPairs) => {
            println!(
                "{}",
                style(
                    "No improvements were generated. The content might already be well-written!"
                )
                .yellow()
            );
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    let original = payload
        .full_original_text
        .clone()
        .or_else(|| payload.full_original_html.clone());
    let units: Vec<DiffUnit> = match original {
        Some(original) => {
            let improved = reconstruct(&original, &pairs);
            align_units(&original, &improved)
        }
        // Legacy hand-off carries only the tagged spans; show the pairs
        // themselves as the comparison.
        None => pairs
            .iter()
            .map(|pair| DiffUnit {
                kind: DiffKind::Changed,
                original: pair.original.clone(),
                improved: pair.improved.clone(),
            })
            .collect(),
    };

    render_diff(&units)?;
    store.clear_all();
    Ok(())
}

/// Follows a server-side hand-off reference back to the full payload.
async fn resolve_store_reference(
    client: &reqwest::Client,
    config: &Config,
    payload: HandoffPayload,
) -> anyhow::Result<HandoffPayload> {
    let Some(id) = payload.store_id.clone() else {
        return Ok(payload);
    };
    let url = format!("{}/api/load", config.services.base_url);
    let response = client.get(&url).query(&[("id", id.as_str())]).send().await;
    match response {
        Ok(response) if response.status().is_success() => {
            let body: serde_json::Value = response.json().await?;
            let stored = body
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let parsed: HandoffPayload = serde_json::from_value(stored)
                .context("server-side hand-off payload is malformed")?;
            Ok(parsed)
        }
        Ok(response) => {
            render_fix_error(&format!(
                "the stored hand-off could not be loaded ({})",
                response.status()
            ));
            bail!("hand-off load failed");
        }
        Err(error) => {
            render_fix_error(&error.to_string());
            bail!("hand-off load failed");
        }
    }
}

fn print_outcome(outcome: &HighlightOutcome) {
    let label = category_label(outcome.span.category);
    match (&outcome.matched, outcome.decorated) {
        (Some(unit), true) => println!(
            "  {label} {} {}",
            style(&unit.text).underlined(),
            style(format!("({:.0}% match)", unit.score * 100.0)).dim()
        ),
        (Some(unit), false) => {
            println!("  {label} {} {}", unit.text, style("(matched)").dim())
        }
        (None, _) => println!(
            "  {label} {} {}",
            outcome.span.text,
            style("(no close match in draft, skipped)").dim()
        ),
    }
}

fn category_label(category: Category) -> String {
    let text = format!("[{category}]");
    match category.style() {
        HighlightStyle::Good => style(text).green().to_string(),
        HighlightStyle::Warning => style(text).yellow().to_string(),
        HighlightStyle::Danger => style(text).red().to_string(),
    }
}

fn print_legend() {
    println!();
    println!(
        "  {}  {}  {}",
        style("■ fluff").green(),
        style("■ spam words").yellow(),
        style("■ hard to read").red()
    );
}

/// Error view for fixer failures: dismissible, with a go-back hint.
fn render_fix_error(message: &str) {
    eprintln!();
    eprintln!("{} {}", style("⚠").red().bold(), style(message).red());
    eprintln!(
        "{}",
        style("← Back: run `gmm grade` to re-analyze your draft.").dim()
    );
}

/// Renders the aligned units as two parallel columns with gutter markers.
fn render_diff(units: &[DiffUnit]) -> anyhow::Result<()> {
    let (_, cols) = console::Term::stdout().size();
    let total = cols as usize;
    if total < 30 {
        // Rendering cannot proceed at all; this one is a blocking error.
        bail!("terminal too narrow to render the comparison");
    }
    let cell = (total - 7) / 2;

    println!();
    println!(
        "{:<width$} │ {}",
        style("Original").bold(),
        style("Improved").bold(),
        width = cell + 2
    );
    println!("{}", "─".repeat(total.min(cell * 2 + 7)));

    for unit in units {
        let (left_mark, right_mark) = match unit.kind {
            DiffKind::Unchanged => (' ', ' '),
            DiffKind::Changed => ('−', '+'),
            DiffKind::Removed => ('−', ' '),
            DiffKind::Added => (' ', '+'),
        };
        let left_lines = wrap_cell(&unit.original, cell);
        let right_lines = wrap_cell(&unit.improved, cell);
        let rows = left_lines.len().max(right_lines.len());
        for row in 0..rows {
            let left = left_lines.get(row).map(String::as_str).unwrap_or("");
            let right = right_lines.get(row).map(String::as_str).unwrap_or("");
            let gutter_left = if row == 0 { left_mark } else { ' ' };
            let gutter_right = if row == 0 { right_mark } else { ' ' };
            let left_cell = format!("{gutter_left} {left:<cell$}");
            let right_cell = format!("{gutter_right} {right}");
            let left_styled = if left_mark == '−' && !left.is_empty() {
                style(left_cell).red().to_string()
            } else {
                left_cell
            };
            let right_styled = if right_mark == '+' && !right.is_empty() {
                style(right_cell).green().to_string()
            } else {
                right_cell
            };
            println!("{left_styled} │ {right_styled}");
        }
    }
    println!();
    Ok(())
}

fn describe_source(path: Option<&Path>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "stdin".into(),
    }
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

/// Reassembles streamed bytes into valid UTF-8, carrying any split
/// multi-byte sequence over to the next chunk.
#[derive(Debug, Default)]
struct Utf8Accumulator {
    carry: Vec<u8>,
}

impl Utf8Accumulator {
    fn push(&mut self, chunk: &[u8]) -> String {
        self.carry.extend_from_slice(chunk);
        match std::str::from_utf8(&self.carry) {
            Ok(valid) => {
                let out = valid.to_string();
                self.carry.clear();
                out
            }
            Err(error) if error.error_len().is_none() => {
                let valid_up_to = error.valid_up_to();
                let out = String::from_utf8_lossy(&self.carry[..valid_up_to]).into_owned();
                self.carry.drain(..valid_up_to);
                out
            }
            Err(_) => {
                // Truly invalid bytes: replace rather than stall the stream.
                let out = String::from_utf8_lossy(&self.carry).into_owned();
                self.carry.clear();
                out
            }
        }
    }
}

fn wrap_cell(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for word in text.split_whitespace() {
        for piece in chunk_word(word, width) {
            let piece_len = piece.chars().count();
            if current_len == 0 {
                current = piece;
                current_len = piece_len;
            } else if current_len + 1 + piece_len <= width {
                current.push(' ');
                current.push_str(&piece);
                current_len += 1 + piece_len;
            } else {
                lines.push(std::mem::take(&mut current));
                current = piece;
                current_len = piece_len;
            }
        }
    }
    if current_len > 0 {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn chunk_word(word: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
