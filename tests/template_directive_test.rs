use chrono::DateTime;
use serde_json::{json, Value};
use squehub::routing::NamedRoutes;
use squehub::session::Session;
use squehub::views::{RenderContext, ViewEngine};
use std::sync::Arc;
use tempfile::TempDir;

fn engine() -> (TempDir, ViewEngine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = ViewEngine::new(temp_dir.path());
    (temp_dir, engine)
}

fn render(source: &str, data: Value) -> String {
    let (_dir, engine) = engine();
    engine
        .render_inline(source, &data, &RenderContext::new())
        .unwrap()
}

fn compact(output: &str) -> String {
    output.split_whitespace().collect()
}

#[test]
fn test_echo_escapes_and_raw_echo_does_not() {
    let data = json!({"name": "<b>Ada</b>"});
    assert_eq!(render("{{ $name }}", data.clone()), "&lt;b&gt;Ada&lt;/b&gt;");
    assert_eq!(render("@echo($name)", data), "<b>Ada</b>");
}

#[test]
fn test_missing_variables_render_empty() {
    assert_eq!(render("[{{ $nothing }}]", json!({})), "[]");
    assert_eq!(render("{{ $nothing ?? 'fallback' }}", json!({})), "fallback");
}

#[test]
fn test_conditionals() {
    let source = "@if($n > 5)big @elseif($n > 1)mid @else small @endif";
    assert_eq!(render(source, json!({"n": 9})).trim(), "big");
    assert_eq!(render(source, json!({"n": 3})).trim(), "mid");
    assert_eq!(render(source, json!({"n": 0})).trim(), "small");
}

#[test]
fn test_foreach_with_keys() {
    let output = render(
        "@foreach($items as $i => $item){{ $i }}={{ $item }};@endforeach",
        json!({"items": ["a", "b"]}),
    );
    assert_eq!(output, "0=a;1=b;");

    let output = render(
        "@foreach($user as $field => $value){{ $field }}:{{ $value }} @endforeach",
        json!({"user": {"name": "Ada", "role": "admin"}}),
    );
    assert_eq!(output.trim(), "name:Ada role:admin");
}

#[test]
fn test_foreach_over_null_renders_nothing() {
    assert_eq!(render("@foreach($missing as $x){{ $x }}@endforeach", json!({})), "");
}

#[test]
fn test_break_and_continue() {
    let source = "@foreach($nums as $n)
        @if($n == 2) @continue @endif
        @if($n == 4) @break @endif
        [{{ $n }}]
    @endforeach";
    let output = render(source, json!({"nums": [1, 2, 3, 4, 5]}));
    assert_eq!(compact(&output), "[1][3]");
}

#[test]
fn test_for_while_and_do_loops() {
    assert_eq!(render("@for($i = 0; $i < 3; $i++){{ $i }}@endfor", json!({})), "012");

    let output = render(
        "@php $i = 3; @endphp @while($i > 0){{ $i }} @php $i--; @endphp @endwhile",
        json!({}),
    );
    assert_eq!(compact(&output), "321");

    let output = render(
        "@php $i = 0; @endphp @do{{ $i }} @php $i++; @endphp @enddo($i < 3)",
        json!({}),
    );
    assert_eq!(compact(&output), "012");
}

#[test]
fn test_do_loop_runs_body_once() {
    let output = render("@do[once] @enddo(false)", json!({}));
    assert_eq!(output.trim(), "[once]");
}

#[test]
fn test_runaway_loop_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let engine = ViewEngine::new(temp_dir.path()).with_max_loop_iterations(5);

    let err = engine
        .render_inline("@while(true)x @endwhile", &json!({}), &RenderContext::new())
        .unwrap_err();
    assert!(err.to_string().contains("maximum of 5 iterations"));
}

#[test]
fn test_php_blocks_assign_into_the_scope() {
    let source = "@php
        $user = ['name' => 'Ada'];
        $user['role'] = 'admin';
        $tags[] = 'x';
        $tags[] = 'y';
    @endphp
    {{ $user['name'] }} {{ $user['role'] }} {{ count($tags) }} {{ implode(',', $tags) }}";
    let output = render(source, json!({}));
    assert_eq!(output.trim(), "Ada admin 2 x,y");
}

#[test]
fn test_functions_in_expressions() {
    let output = render(
        "{{ strtoupper($name) }} {{ number_format($price, 2) }} {{ $count > 1 ? 'items' : 'item' }}",
        json!({"name": "ada", "price": 1234.5, "count": 2}),
    );
    assert_eq!(output, "ADA 1,234.50 items");
}

#[test]
fn test_unknown_function_is_an_error() {
    let (_dir, engine) = engine();
    let result = engine.render_inline("{{ nope(1) }}", &json!({}), &RenderContext::new());
    assert!(result.is_err());
}

#[test]
fn test_email_and_unknown_at_words_are_text() {
    let output = render("Write to info@if.com or @someone", json!({}));
    assert_eq!(output, "Write to info@if.com or @someone");
}

#[test]
fn test_directives_glued_to_text() {
    assert_eq!(
        render("@section('title')Dashboard@endsection[@yield('title')]", json!({})),
        "[Dashboard]"
    );
    assert_eq!(render("@if($on)yes@else no@endif", json!({"on": true})), "yes");
    assert_eq!(render("@if($on)yes@else no@endif", json!({"on": false})), " no");
    assert_eq!(
        render("<p>Total: {{ $n }}@if($n > 1)items@endif</p>", json!({"n": 3})),
        "<p>Total: 3items</p>"
    );

    let (_dir, engine) = engine();
    let now = DateTime::parse_from_rfc3339("2024-03-01T14:05:09+02:00").unwrap();
    let output = engine
        .render_inline("Copyright@year", &json!({}), &RenderContext::new().with_now(now))
        .unwrap();
    assert_eq!(output, "Copyright2024");
}

#[test]
fn test_comments_are_dropped() {
    assert_eq!(render("a<!-- {{ $secret }} -->b", json!({"secret": "x"})), "ab");
}

#[test]
fn test_compile_errors() {
    let (_dir, engine) = engine();
    let ctx = RenderContext::new();

    let err = engine
        .render_inline("@if($a) open", &json!({}), &ctx)
        .unwrap_err();
    assert!(err.to_string().contains("Unclosed @if"));

    let err = engine.render_inline("@break", &json!({}), &ctx).unwrap_err();
    assert!(err.to_string().contains("outside of a loop"));

    let err = engine
        .render_inline("@foreach($a as $b) @endif", &json!({}), &ctx)
        .unwrap_err();
    assert!(err.to_string().contains("@endif"));
}

#[test]
fn test_notifications_are_consumed() {
    let (_dir, engine) = engine();
    let session = Arc::new(Session::new("test-session"));
    session.notify("success", "Saved <ok>").unwrap();
    let ctx = RenderContext::new().with_session(Arc::clone(&session));

    let first = engine
        .render_inline("@notification('success')", &json!({}), &ctx)
        .unwrap();
    assert_eq!(first, "<p style=\"color: green; \">Saved &lt;ok&gt;</p>");

    let second = engine
        .render_inline("@notification('success')", &json!({}), &ctx)
        .unwrap();
    assert_eq!(second, "");
}

#[test]
fn test_has_notification_exposes_message() {
    let (_dir, engine) = engine();
    let session = Arc::new(Session::new("test-session"));
    session.notify("error", "Oops").unwrap();
    let ctx = RenderContext::new().with_session(session);

    let source = "@hasNotification('error')<span>{{ $message }}</span> @endhasNotification";
    let output = engine.render_inline(source, &json!({}), &ctx).unwrap();
    assert_eq!(output.trim(), "<span>Oops</span>");

    let output = engine.render_inline(source, &json!({}), &ctx).unwrap();
    assert_eq!(output, "");
}

#[test]
fn test_has_notification_message_is_scoped_to_block() {
    let (_dir, engine) = engine();
    let session = Arc::new(Session::new("test-session"));
    session.notify("error", "Oops").unwrap();
    session.notify("info", "Heads up").unwrap();
    let ctx = RenderContext::new().with_session(session);

    let source = "@hasNotification('error')[{{ $message }}]@endhasNotification<{{ $message ?? 'none' }}>";
    let output = engine.render_inline(source, &json!({}), &ctx).unwrap();
    assert_eq!(output, "[Oops]<none>");

    let source = "@hasNotification('info')[{{ $message }}]@endhasNotification<{{ $message }}>";
    let output = engine
        .render_inline(source, &json!({"message": "page"}), &ctx)
        .unwrap();
    assert_eq!(output, "[Heads up]<page>");
}

#[test]
fn test_yield_marker_in_data_is_not_expanded() {
    let forged = json!({"s": "\u{1A}squehub-yield-0\u{1A}"});
    assert_eq!(render("@yield('t', 'D'){{ $s }}", forged.clone()), "Dsquehub-yield-0");
    assert_eq!(render("@yield('t', 'D')@echo($s)", forged.clone()), "Dsquehub-yield-0");
    assert_eq!(
        render("@section('t')S@endsection@php echo $s; @endphp[@yield('t')]", forged),
        "squehub-yield-0[S]"
    );
}

#[test]
fn test_date_directives_use_render_clock() {
    let (_dir, engine) = engine();
    let now = DateTime::parse_from_rfc3339("2024-03-01T14:05:09+02:00").unwrap();
    let ctx = RenderContext::new().with_now(now);

    let output = engine
        .render_inline("@year @month @date @time @datetime('D, jS M')", &json!({}), &ctx)
        .unwrap();
    assert_eq!(output, "2024 March 2024-03-01 14:05:09 Fri, 1st Mar");
}

#[test]
fn test_csrf_field_uses_session_token() {
    let (_dir, engine) = engine();
    let session = Arc::new(Session::new("test-session"));
    let ctx = RenderContext::new().with_session(Arc::clone(&session));

    let field = engine.render_inline("@csrf", &json!({}), &ctx).unwrap();
    let token: String = session.get("_token").unwrap();
    assert_eq!(token.len(), 64);
    assert_eq!(
        field,
        format!("<input type=\"hidden\" name=\"_token\" value=\"{}\">", token)
    );

    let again = engine
        .render_inline("{{ csrf_token() }}", &json!({}), &ctx)
        .unwrap();
    assert_eq!(again, token);
}

#[test]
fn test_route_and_session_helpers() {
    let (_dir, engine) = engine();
    let mut routes = NamedRoutes::new();
    routes.insert("users.show", "/users/{id}");
    let session = Arc::new(Session::new("test-session"));
    session.set("user", "ada").unwrap();
    let ctx = RenderContext::new()
        .with_routes(Arc::new(routes))
        .with_session(session);

    let output = engine
        .render_inline(
            "{{ route('users.show', ['id' => 5]) }} {{ route('missing') }} {{ session('user') }}",
            &json!({}),
            &ctx,
        )
        .unwrap();
    assert_eq!(output, "/users/5 # ada");
}
