use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use squehub::views::{compile, RenderContext, ViewEngine};
use std::fs;
use tempfile::TempDir;

const PAGE: &str = r#"@extends('layouts.app')
@section('title')Users @endsection
<ul>
@foreach($users as $user)
    <li class="{{ $loop_class ?? 'row' }}">{{ ucfirst($user['name']) }} ({{ $user['age'] }})</li>
@endforeach
</ul>"#;

const LAYOUT: &str = "<html><head><title>@yield('title')</title></head><body>@yield('content')</body></html>";

fn setup(cache: bool) -> (TempDir, ViewEngine) {
    let temp_dir = TempDir::new().unwrap();
    let views = temp_dir.path().join("views");
    fs::create_dir_all(views.join("layouts")).unwrap();
    fs::write(views.join("layouts/app.squehub.html"), LAYOUT).unwrap();
    fs::write(views.join("users.squehub.html"), PAGE).unwrap();

    let engine = ViewEngine::new(&views);
    let engine = if cache {
        engine.with_cache_directory(temp_dir.path().join("cache"))
    } else {
        engine
    };
    (temp_dir, engine)
}

fn benchmark_compile(c: &mut Criterion) {
    c.bench_function("compile_page", |b| {
        b.iter(|| black_box(compile(black_box(PAGE)).unwrap()))
    });
}

fn benchmark_render(c: &mut Criterion) {
    let users: Vec<_> = (0..50)
        .map(|i| json!({"name": format!("user{}", i), "age": 20 + i}))
        .collect();
    let data = json!({ "users": users });
    let ctx = RenderContext::new();

    let (_cold_dir, uncached) = setup(false);
    c.bench_function("render_uncached", |b| {
        b.iter(|| black_box(uncached.render_with("users", &data, &ctx).unwrap()))
    });

    let (_warm_dir, cached) = setup(true);
    cached.render_with("users", &data, &ctx).unwrap();
    c.bench_function("render_cached", |b| {
        b.iter(|| black_box(cached.render_with("users", &data, &ctx).unwrap()))
    });
}

criterion_group!(benches, benchmark_compile, benchmark_render);
criterion_main!(benches);
