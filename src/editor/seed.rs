//! Reads the initial stop list back out of a server-rendered route page.
use itertools::Itertools;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::{
    model::{RouteId, Stop, StopTime, parse_delay},
    utils::{last_path_segment, str_between_str},
};

const ROUTE_ID_MARKER: &str = "window.ROUTE_ID =";

fn selector(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector is valid")
}

static TIMELINE: LazyLock<Selector> = LazyLock::new(|| selector(".timeline"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector(".stop-row"));
static END_ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector(".end-icon"));
static FIELD_NAME: LazyLock<Selector> = LazyLock::new(|| selector(".field-name"));
static FIELD_TIME: LazyLock<Selector> = LazyLock::new(|| selector(".field-time"));
static FIELD_DELAY: LazyLock<Selector> = LazyLock::new(|| selector(".field-delay"));
static ROUTE_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(".route-title"));
static SCRIPT: LazyLock<Selector> = LazyLock::new(|| selector("script"));
static ACTIONS: LazyLock<[(&str, Selector); 3]> = LazyLock::new(|| {
    ["add", "sub", "delete"]
        .map(|action| (action, selector(&format!(r#"button[data-action="{action}"]"#))))
});

/// What the editor starts from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeededRoute {
    pub route_id: Option<RouteId>,
    pub title: String,
    pub stops: Vec<Stop>,
}

#[derive(thiserror::Error, Debug)]
pub enum SeedError {
    #[error("the page has no .timeline to edit")]
    MissingTimeline,
}

/// Every `.stop-row` of the timeline in page order.
///
/// Unreadable delays count as 0 and unreadable times as 00:00. Rows without
/// their action buttons and a timeline without its end anchor are still read,
/// with a warning, since a page in that shape can't have been wired up
/// correctly.
#[tracing::instrument(skip_all, err)]
pub fn parse_route_page(html: &str) -> Result<SeededRoute, SeedError> {
    let document = Html::parse_document(html);

    let timeline = document
        .select(&TIMELINE)
        .next()
        .ok_or(SeedError::MissingTimeline)?;

    if timeline.select(&END_ANCHOR).next().is_none() {
        warn!("timeline has no end anchor");
    }

    let stops = timeline
        .select(&ROW)
        .enumerate()
        .map(|(position, row)| read_row(position, row))
        .collect_vec();

    let title = document
        .select(&ROUTE_TITLE)
        .next()
        .map(|title| title.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let route_id = document
        .select(&SCRIPT)
        .find_map(|script| page_route_id(&script.text().collect::<String>()));

    info!(stops = stops.len(), ?route_id, "read route page");

    Ok(SeededRoute {
        route_id,
        title,
        stops,
    })
}

fn read_row(position: usize, row: ElementRef) -> Stop {
    for (action, selector) in ACTIONS.iter() {
        if row.select(selector).next().is_none() {
            warn!(position, action, "row is missing an action button");
        }
    }

    let field = |selector: &Selector, name: &str| {
        let value = row
            .select(selector)
            .next()
            .and_then(|input| input.value().attr("value"));

        if value.is_none() {
            warn!(position, field = name, "row is missing a field");
        }

        value.unwrap_or_default()
    };

    let name = field(&FIELD_NAME, "name").to_string();

    let time_text = field(&FIELD_TIME, "time");
    let time = time_text.parse().unwrap_or_else(|e| {
        warn!(position, "{e}, using 00:00");
        StopTime::default()
    });

    let delay = parse_delay(field(&FIELD_DELAY, "delay"));

    Stop { name, time, delay }
}

/// Reads `window.ROUTE_ID = "...";` from a script body.
///
/// The value is read as one JSON value, so a `;` inside the id doesn't end it.
fn page_route_id(script: &str) -> Option<RouteId> {
    let start = script.find(ROUTE_ID_MARKER)? + ROUTE_ID_MARKER.len();
    let rest = script[start..].trim_start();

    if let Some(Ok(id)) = serde_json::Deserializer::from_str(rest)
        .into_iter::<Option<String>>()
        .next()
    {
        return id.and_then(RouteId::new);
    }

    // `null;` and non-JSON values end at the statement
    let value = str_between_str(script, ROUTE_ID_MARKER, ";")?.trim();
    match serde_json::from_str::<Option<String>>(value) {
        Ok(id) => id.and_then(RouteId::new),
        Err(_) => RouteId::new(value.trim_matches(|c| c == '\'' || c == '"')),
    }
}

/// Picks the route to save to: an explicit id first, then the one the page
/// provides, then the last segment of the page URL.
pub fn resolve_route_id(
    explicit: Option<&str>,
    from_page: Option<RouteId>,
    page_url: &Url,
) -> Option<RouteId> {
    explicit
        .and_then(RouteId::new)
        .or(from_page)
        .or_else(|| last_path_segment(page_url).and_then(RouteId::new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::Route, render};

    fn route() -> Route {
        Route {
            id: RouteId::new("line-33").unwrap(),
            title: "Line 33".to_string(),
            stops: vec![
                Stop::new("Oosterblok", "17:53".parse().unwrap(), 9),
                Stop::new(r#"De veer "QD" & co"#, "17:55".parse().unwrap(), -7),
                Stop::new("Baaier", "23:59".parse().unwrap(), 0),
            ],
        }
    }

    #[test]
    fn rendered_pages_read_back_to_the_same_route() -> Result<(), anyhow::Error> {
        let route = route();
        let seeded = parse_route_page(&render::route_page(&route))?;

        assert_eq!(seeded.route_id, Some(route.id));
        assert_eq!(seeded.title, "Line 33");
        assert_eq!(seeded.stops, route.stops);

        Ok(())
    }

    #[test]
    fn pages_without_a_timeline_are_rejected() {
        let result = parse_route_page("<html><body><p>nothing here</p></body></html>");

        assert!(matches!(result, Err(SeedError::MissingTimeline)));
    }

    #[test]
    fn broken_field_values_fall_back_to_defaults() -> Result<(), anyhow::Error> {
        let html = r#"<div class="timeline">
            <div class="stop-row">
              <input class="field-name" value="Bosweg">
              <input class="field-time" value="soon">
              <input class="field-delay" value="">
            </div>
            <div class="stop-row"></div>
            <div class="end-icon"></div>
        </div>"#;

        let seeded = parse_route_page(html)?;

        assert_eq!(seeded.route_id, None);
        assert_eq!(
            seeded.stops,
            vec![
                Stop::new("Bosweg", StopTime::default(), 0),
                Stop::new("", StopTime::default(), 0),
            ]
        );

        Ok(())
    }

    #[test]
    fn route_id_script_forms() {
        assert_eq!(
            page_route_id(r#"window.ROUTE_ID = "line-33";"#),
            RouteId::new("line-33")
        );
        assert_eq!(
            page_route_id("window.ROUTE_ID = 'night-bus';"),
            RouteId::new("night-bus")
        );
        assert_eq!(page_route_id("window.ROUTE_ID = null;"), None);
        assert_eq!(page_route_id("console.log(1);"), None);
        assert_eq!(
            page_route_id(r#"window.ROUTE_ID = "line-33;-night";"#),
            RouteId::new("line-33;-night")
        );
    }

    #[test]
    fn ids_with_semicolons_read_back_whole() -> Result<(), anyhow::Error> {
        let route = Route {
            id: RouteId::new("line-33;-night").unwrap(),
            ..route()
        };

        let seeded = parse_route_page(&render::route_page(&route))?;

        assert_eq!(seeded.route_id, Some(route.id));

        Ok(())
    }

    #[test]
    fn explicit_route_id_wins_then_page_then_url() -> Result<(), anyhow::Error> {
        let url = Url::parse("http://localhost:3000/route/from-url")?;
        let page = RouteId::new("from-page");

        assert_eq!(
            resolve_route_id(Some("explicit"), page.clone(), &url),
            RouteId::new("explicit")
        );
        assert_eq!(resolve_route_id(None, page.clone(), &url), page);
        assert_eq!(
            resolve_route_id(Some("  "), None, &url),
            RouteId::new("from-url")
        );
        assert_eq!(
            resolve_route_id(None, None, &Url::parse("http://localhost:3000/")?),
            None
        );

        Ok(())
    }
}
