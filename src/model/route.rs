use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::LazyLock};

use super::stop::Stop;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Opaque key of the route whose stops are being edited.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(String);

impl RouteId {
    /// Returns `None` for blank identifiers.
    pub fn new(id: impl AsRef<str>) -> Option<Self> {
        let id = id.as_ref().trim();
        (!id.is_empty()).then(|| RouteId(id.to_string()))
    }

    /// Derives an identifier from a route title, "Line 33 Night" becomes "line-33-night".
    pub fn from_title(title: &str) -> Option<Self> {
        RouteId::new(WHITESPACE.replace_all(title.trim(), "-").to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub title: String,
    #[serde(default)]
    pub stops: Vec<Stop>,
}

/// Body of `PUT /api/route/{id}`: replaces every stop of the route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRouteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub stops: Vec<Stop>,
}

/// Body of `POST /api/route`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CreateRouteRequest {
    pub title: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub stops: Vec<Stop>,
}

/// Body of `POST /api/route/{id}/delete_stop`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeleteStopRequest {
    pub index: Option<usize>,
}
