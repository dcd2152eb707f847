//! Benchmarks for marker reconciliation.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use wrapmark::prelude::*;

fn sample_text(rows: usize) -> String {
    (0..rows)
        .map(|row| format!("row {row} has some words that wrap past the column limit"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_cached_screen_position(c: &mut Criterion) {
    let display = DisplayMap::new(TextBuffer::from_text(&sample_text(200)));
    display.set_soft_wrap_column(Some(20));
    let marker = display
        .mark_buffer_position(Point::new(150, 30), MarkOptions::default())
        .unwrap();
    let _subscription = marker.observe(|_| {}).unwrap();
    c.bench_function("cached_screen_position", |b| {
        b.iter(|| black_box(marker.head_screen_position().unwrap()))
    });
}

fn bench_edit_with_observed_markers(c: &mut Criterion) {
    let buffer = TextBuffer::from_text(&sample_text(200));
    let display = DisplayMap::new(buffer.clone());
    display.set_soft_wrap_column(Some(20));
    let markers: Vec<DisplayMarker> = (0..50)
        .map(|row| {
            display
                .mark_buffer_range(Range::new((row * 4, 0), (row * 4, 12)), MarkOptions::default())
                .unwrap()
        })
        .collect();
    let _subscriptions: Vec<_> = markers
        .iter()
        .map(|marker| marker.observe(|_| {}).unwrap())
        .collect();
    c.bench_function("edit_with_50_observed_markers", |b| {
        b.iter(|| {
            buffer.insert(black_box(Point::new(100, 5)), "x");
            buffer.delete(Range::new((100, 5), (100, 6)));
        })
    });
}

fn bench_rewrap(c: &mut Criterion) {
    let display = DisplayMap::new(TextBuffer::from_text(&sample_text(200)));
    let marker = display
        .mark_buffer_position(Point::new(199, 40), MarkOptions::default())
        .unwrap();
    let _subscription = marker.observe(|_| {}).unwrap();
    let mut width = 20;
    c.bench_function("rewrap_and_refresh", |b| {
        b.iter(|| {
            width = if width == 20 { 30 } else { 20 };
            display.set_soft_wrap_column(Some(black_box(width)));
        })
    });
}

criterion_group!(
    benches,
    bench_cached_screen_position,
    bench_edit_with_observed_markers,
    bench_rewrap
);
criterion_main!(benches);
