//! Wrapmark - watch markers move through soft-wrapped, folded text.
//!
//! # Usage
//!
//! ```bash
//! wrapmark notes.txt --soft-wrap-column 20 --mark 0:6-0:11 --edit 0:0-0:0=">> "
//! wrapmark notes.txt --fold 2-5 --mark 4:0 --json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use wrapmark::buffer::{Invalidation, MarkOptions, TextBuffer};
use wrapmark::config::{
    ConfigFlags, clear_config_flags, global_config_path, load_config_flags, local_override_path,
    parse_flag_tokens, save_config_flags,
};
use wrapmark::display::{DisplayMap, ScreenLine};
use wrapmark::event::Subscription;
use wrapmark::marker::{DisplayMarker, MarkerChange};
use wrapmark::point::Range;

/// Track buffer ranges through soft wrapping and folds
#[derive(Parser, Debug)]
#[command(name = "wrapmark", version, about, long_about = None)]
struct Cli {
    /// Text file to load
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Wrap rows wider than this many display cells
    #[arg(long, value_name = "N")]
    soft_wrap_column: Option<usize>,

    /// Disable soft wrapping, overriding any saved column
    #[arg(long)]
    no_soft_wrap: bool,

    /// Mark a buffer range (ROW:COL-ROW:COL) or position (ROW:COL)
    #[arg(long, value_name = "RANGE")]
    mark: Vec<Range>,

    /// Fold buffer rows START-END behind row START
    #[arg(long, value_name = "START-END", value_parser = parse_fold)]
    fold: Vec<(usize, usize)>,

    /// Replace RANGE with TEXT after the markers are placed (\n for newline)
    #[arg(long, value_name = "RANGE=TEXT", value_parser = parse_edit)]
    edit: Vec<(Range, String)>,

    /// Which edits invalidate a marker
    #[arg(long, value_enum)]
    invalidate: Option<Invalidation>,

    /// Treat insertions at marker boundaries as outside the marker
    #[arg(long)]
    exclusive: bool,

    /// Print change events and the final state as JSON lines
    #[arg(long)]
    json: bool,

    /// Save current command-line flags as defaults
    #[arg(long)]
    save: bool,

    /// Clear saved defaults
    #[arg(long)]
    clear: bool,
}

fn parse_fold(s: &str) -> Result<(usize, usize), String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got {s:?}"))?;
    let start = start.trim().parse().map_err(|_| format!("bad start row {start:?}"))?;
    let end = end.trim().parse().map_err(|_| format!("bad end row {end:?}"))?;
    Ok((start, end))
}

fn parse_edit(s: &str) -> Result<(Range, String), String> {
    let (range, text) = s
        .split_once('=')
        .ok_or_else(|| format!("expected RANGE=TEXT, got {s:?}"))?;
    let range = range.parse::<Range>().map_err(|err| err.to_string())?;
    Ok((range, text.replace("\\n", "\n")))
}

#[derive(Serialize)]
struct ChangeLine<'a> {
    marker: String,
    #[serde(flatten)]
    change: &'a MarkerChange,
}

#[derive(Serialize)]
struct ScreenRow {
    #[serde(flatten)]
    line: ScreenLine,
    text: String,
}

#[derive(Serialize)]
struct MarkerState {
    marker: String,
    buffer_range: Range,
    screen_range: Range,
    valid: bool,
}

fn print_change(marker: &str, change: &MarkerChange, json: bool) {
    if json {
        match serde_json::to_string(&ChangeLine { marker: marker.to_string(), change }) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(%err, "failed to encode change"),
        }
        return;
    }
    println!(
        "marker {marker}: screen {}-{} -> {}-{} (buffer {}-{}){}{}",
        change.old_tail_screen_position,
        change.old_head_screen_position,
        change.new_tail_screen_position,
        change.new_head_screen_position,
        change.new_tail_buffer_position,
        change.new_head_buffer_position,
        if change.buffer_changed { ", edited" } else { "" },
        if change.valid { "" } else { ", invalid" },
    );
}

fn observe_all(markers: &[DisplayMarker], json: bool) -> Result<Vec<Subscription>> {
    markers
        .iter()
        .map(|marker| {
            let id = marker.id().to_string();
            marker
                .observe(move |change| print_change(&id, change, json))
                .with_context(|| format!("Failed to observe marker {}", marker.id()))
        })
        .collect()
}

fn print_screen(display: &DisplayMap, json: bool) -> Result<()> {
    for row in 0..display.screen_line_count() {
        let (Some(line), Some(text)) = (display.screen_line(row), display.text_for_screen_row(row))
        else {
            continue;
        };
        if json {
            println!("{}", serde_json::to_string(&ScreenRow { line, text })?);
        } else {
            let gutter = if line.start_column == 0 {
                format!("{:>4}", line.buffer_row)
            } else {
                "   ~".to_string()
            };
            let fold = if line.folded && !line.soft_wrapped { " ..." } else { "" };
            println!("{gutter} | {text}{fold}");
        }
    }
    Ok(())
}

fn print_markers(markers: &[DisplayMarker], json: bool) -> Result<()> {
    for marker in markers {
        let state = MarkerState {
            marker: marker.id().to_string(),
            buffer_range: marker.buffer_range()?,
            screen_range: marker.screen_range()?,
            valid: marker.is_valid(),
        };
        if json {
            println!("{}", serde_json::to_string(&state)?);
        } else {
            println!(
                "marker {}: buffer {} screen {}{}",
                state.marker,
                state.buffer_range,
                state.screen_range,
                if state.valid { "" } else { " (invalid)" }
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let raw_args = std::env::args().collect::<Vec<_>>();
    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = parse_flag_tokens(&raw_args);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);
    tracing::debug!(?effective, "effective flags");

    let text = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let buffer = TextBuffer::from_text(&text);
    let display = DisplayMap::new(buffer.clone());
    display.set_soft_wrap_column(effective.effective_soft_wrap_column());

    for &(start, end) in &cli.fold {
        display
            .fold_buffer_rows(start, end)
            .with_context(|| format!("Failed to fold rows {start}-{end}"))?;
    }

    let options = MarkOptions {
        reversed: false,
        exclusive: effective.exclusive.then_some(true),
        invalidate: effective.invalidate.unwrap_or_default(),
    };
    let markers = cli
        .mark
        .iter()
        .map(|&range| {
            if range.is_empty() {
                display.mark_buffer_position(range.start, options)
            } else {
                display.mark_buffer_range(range, options)
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to create markers")?;
    let subscriptions = observe_all(&markers, effective.json)?;

    for (range, text) in &cli.edit {
        let inserted = buffer.set_text_in_range(*range, text);
        tracing::debug!(edited = %range, %inserted, "edit applied");
    }

    print_screen(&display, effective.json)?;
    print_markers(&markers, effective.json)?;

    drop(subscriptions);
    for marker in &markers {
        marker.destroy();
    }
    Ok(())
}
