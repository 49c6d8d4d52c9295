//! HTML for the route pages.
//!
//! [`stop_row`] is the only row template. The server page and the editor's
//! timeline projection both go through it, so a row produced by either side has
//! the same structure and the same selectors the seeder relies on.
use itertools::Itertools;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::model::{Route, RouteId, Stop, delay_label};

/// Escaped when a route id becomes a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Marks the end of the timeline. New rows go before it.
pub const END_ANCHOR: &str = r#"<div class="end-icon"></div>"#;

pub fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

pub fn stop_row(index: usize, stop: &Stop) -> String {
    let name = escape_html(&stop.name);
    let time = stop.time;
    let delay = stop.delay;
    let label = delay_label(delay);
    let updated = stop.updated_time();
    let class = if stop.is_delayed() {
        "stop-row delayed"
    } else {
        "stop-row"
    };

    format!(
        r#"<div class="{class}" data-index="{index}">
  <div class="time-left">
    <strong>{time}</strong>
    <div class="delay-inline">{label}</div>
    <div class="updated-time">{updated}</div>
  </div>
  <div class="line-area"><div class="line-dot"></div></div>
  <div class="right-card">
    <div class="card-row">
      <div><div class="stop-name">{name}</div></div>
      <div class="stop-fields">
        <input class="field-name" type="text" data-field="name" value="{name}">
        <input class="field-time" type="time" data-field="time" value="{time}">
        <input class="field-delay" type="number" data-field="delay" value="{delay}">
      </div>
      <div class="stop-actions">
        <button data-action="sub" type="button" class="small-btn">-1</button>
        <button data-action="add" type="button" class="small-btn">+1</button>
        <button data-action="delete" type="button" class="small-btn danger">Delete</button>
      </div>
    </div>
  </div>
</div>"#
    )
}

/// Rows followed by the end anchor, the inside of `.timeline`.
pub fn timeline<'a>(stops: impl IntoIterator<Item = &'a Stop>) -> String {
    stops
        .into_iter()
        .enumerate()
        .map(|(i, stop)| stop_row(i, stop))
        .chain([END_ANCHOR.to_string()])
        .join("\n")
}

pub fn route_page(route: &Route) -> String {
    let title = escape_html(&route.title);
    let timeline = timeline(&route.stops);
    // keeps "</script>" inside an id from closing the tag
    let route_id = serde_json::Value::from(route.id.as_str())
        .to_string()
        .replace("</", "<\\/");

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
</head>
<body>
<h1 class="route-title">{title}</h1>
<div class="controls">
  <button id="add-stop" type="button">Add stop</button>
  <button id="reset-route" type="button">Reset route</button>
</div>
<div class="timeline">
{timeline}
</div>
<script>window.ROUTE_ID = {route_id};</script>
</body>
</html>
"#
    )
}

/// `/route/{id}` with the id as one percent-encoded segment.
pub fn route_path(route_id: &RouteId) -> String {
    format!("/route/{}", utf8_percent_encode(route_id.as_str(), PATH_SEGMENT))
}

pub fn index_page<'a>(routes: impl IntoIterator<Item = &'a Route>) -> String {
    let items = routes
        .into_iter()
        .map(|route| {
            format!(
                r#"  <li><a href="{}">{}</a> ({} stops)</li>"#,
                escape_html(&route_path(&route.id)),
                escape_html(&route.title),
                route.stops.len()
            )
        })
        .join("\n");

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Routes</title>
</head>
<body>
<h1>Routes</h1>
<ul class="routes">
{items}
</ul>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_escape_user_text() {
        let stop = Stop::new(r#"<b>"Bosweg"</b>"#, "18:05".parse().unwrap(), 5);
        let html = stop_row(0, &stop);

        assert!(html.contains("&lt;b&gt;&quot;Bosweg&quot;&lt;/b&gt;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn rows_show_the_updated_time() {
        let stop = Stop::new("Bosweg", "23:50".parse().unwrap(), 20);
        let html = stop_row(3, &stop);

        assert!(html.contains(r#"class="stop-row delayed" data-index="3""#));
        assert!(html.contains(r#"<div class="delay-inline">(+20 min)</div>"#));
        assert!(html.contains(r#"<div class="updated-time">00:10</div>"#));
    }

    #[test]
    fn timeline_ends_with_the_anchor() {
        let stops = vec![Stop::default(), Stop::default()];
        let html = timeline(&stops);

        assert!(html.ends_with(END_ANCHOR));
        assert_eq!(html.matches("stop-row").count(), 2);
    }

    #[test]
    fn route_id_cannot_break_out_of_the_script() {
        let route = Route {
            id: RouteId::new("x</script><script>alert(1)").unwrap(),
            title: "T".to_string(),
            stops: vec![],
        };
        let html = route_page(&route);

        assert_eq!(html.matches("</script>").count(), 1);
    }

    #[test]
    fn index_links_keep_the_id_in_one_segment() {
        let route = Route {
            id: RouteId::new("line 33/b?night").unwrap(),
            title: "Line 33".to_string(),
            stops: vec![],
        };
        let html = index_page([&route]);

        assert!(html.contains(r#"<a href="/route/line%2033%2Fb%3Fnight">Line 33</a>"#));
    }
}
