use itertools::Itertools;
use std::{fmt, future::Future, str::FromStr, sync::Arc};
use tracing::{info, warn};

use super::{
    autosave::{AutosaveSettings, Autosaver, SaveRoute, SaveStatus},
    seed::SeededRoute,
};
use crate::{
    model::{InvalidStopTime, RouteId, Stop, StopTime, delay_label, parse_delay},
    render,
};

pub const RESET_PROMPT: &str = "Reset all delays to 0?";

/// Stable handle of one row, unaffected by rows added or removed around it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RowId(u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Name,
    Time,
    Delay,
}

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Field::Name),
            "time" => Ok(Field::Time),
            "delay" => Ok(Field::Delay),
            other => Err(UnknownField(other.to_string())),
        }
    }
}

/// One-minute step of a stop's delay.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Nudge {
    Up,
    Down,
}

impl Nudge {
    pub fn minutes(self) -> i32 {
        match self {
            Nudge::Up => 1,
            Nudge::Down => -1,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown field \"{0}\", expected name, time or delay")]
pub struct UnknownField(pub String);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EditError {
    #[error("there is no stop row {0:?}")]
    UnknownRow(RowId),

    #[error(transparent)]
    InvalidTime(#[from] InvalidStopTime),
}

/// One row as it is shown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowView {
    pub id: RowId,
    pub position: usize,
    pub name: String,
    pub time: StopTime,
    pub delay: i32,
    pub delay_label: String,
    pub updated_time: StopTime,
    pub is_delayed: bool,
}

impl fmt::Display for RowView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>3}  {} {:<10} -> {}  {}",
            self.position + 1,
            self.time,
            self.delay_label,
            self.updated_time,
            self.name
        )
    }
}

#[derive(Clone, Debug)]
struct StopRow {
    id: RowId,
    stop: Stop,
}

/// Editing session for the stops of one route.
///
/// The row list is the only copy of the stops. Every change schedules an
/// autosave of the whole list, and views are derived from the list on demand.
pub struct RouteEditor {
    route_id: Option<RouteId>,
    title: String,
    rows: Vec<StopRow>,
    next_row: u64,
    autosave: Autosaver,
}

impl RouteEditor {
    /// Starts a session from a seeded route. Without a route id the editor
    /// still works but nothing is persisted.
    pub fn open<S: SaveRoute>(route: SeededRoute, sink: Arc<S>, settings: AutosaveSettings) -> Self {
        let SeededRoute {
            route_id,
            title,
            stops,
        } = route;

        match &route_id {
            Some(id) => info!(route_id = %id, stops = stops.len(), "editing route"),
            None => warn!("no route identifier, edits will not be saved"),
        }

        let autosave = Autosaver::spawn(route_id.clone(), sink, settings);

        let mut editor = RouteEditor {
            route_id,
            title,
            rows: Vec::with_capacity(stops.len()),
            next_row: 0,
            autosave,
        };
        for stop in stops {
            editor.push_row(stop);
        }

        editor
    }

    pub fn route_id(&self) -> Option<&RouteId> {
        self.route_id.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn stops(&self) -> Vec<Stop> {
        self.rows.iter().map(|row| row.stop.clone()).collect_vec()
    }

    pub fn stop(&self, row: RowId) -> Option<&Stop> {
        self.rows.iter().find(|r| r.id == row).map(|r| &r.stop)
    }

    /// Handle of the row at a zero-based position.
    pub fn row_at(&self, position: usize) -> Option<RowId> {
        self.rows.get(position).map(|row| row.id)
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView> + '_ {
        self.rows.iter().enumerate().map(|(position, row)| RowView {
            id: row.id,
            position,
            name: row.stop.name.clone(),
            time: row.stop.time,
            delay: row.stop.delay,
            delay_label: delay_label(row.stop.delay),
            updated_time: row.stop.updated_time(),
            is_delayed: row.stop.is_delayed(),
        })
    }

    /// The rows as page markup, identical to what the server renders.
    pub fn timeline_html(&self) -> String {
        render::timeline(self.rows.iter().map(|row| &row.stop))
    }

    pub fn save_status(&self) -> SaveStatus {
        self.autosave.status()
    }

    /// Appends a stop at the end of the timeline.
    pub fn add_stop(&mut self, stop: Option<Stop>) -> RowId {
        let stop = stop.unwrap_or_default();
        info!(name = %stop.name, time = %stop.time, delay = stop.delay, "adding stop");

        let id = self.push_row(stop);
        self.schedule_save();

        id
    }

    /// Removes the row right away, no confirmation.
    pub fn delete_stop(&mut self, row: RowId) -> Result<Stop, EditError> {
        let position = self.position(row)?;
        let removed = self.rows.remove(position);
        info!(position, name = %removed.stop.name, "deleted stop");

        self.schedule_save();

        Ok(removed.stop)
    }

    /// Moves the row's delay one minute up or down, returns the new delay.
    pub fn adjust_delay(&mut self, row: RowId, nudge: Nudge) -> Result<i32, EditError> {
        let stop = self.stop_mut(row)?;
        stop.delay = stop.delay.saturating_add(nudge.minutes());
        let delay = stop.delay;

        self.schedule_save();

        Ok(delay)
    }

    /// Applies a typed value to one field of a row.
    ///
    /// Delay text that isn't a number counts as 0. A time that isn't "HH:MM"
    /// is refused and leaves the row as it was.
    pub fn edit_field(&mut self, row: RowId, field: Field, value: &str) -> Result<(), EditError> {
        let time = match field {
            Field::Time => Some(value.parse::<StopTime>()?),
            _ => None,
        };

        let stop = self.stop_mut(row)?;
        match field {
            Field::Name => stop.name = value.to_string(),
            Field::Time => stop.time = time.unwrap_or(stop.time),
            Field::Delay => stop.delay = parse_delay(value),
        }

        self.schedule_save();

        Ok(())
    }

    /// Sets every delay to 0 once `confirm` agrees to [`RESET_PROMPT`].
    /// Returns whether the reset happened.
    pub async fn reset_all_delays<F, Fut>(&mut self, confirm: F) -> bool
    where
        F: FnOnce(&'static str) -> Fut,
        Fut: Future<Output = bool>,
    {
        if !confirm(RESET_PROMPT).await {
            info!("reset cancelled");
            return false;
        }

        for row in &mut self.rows {
            row.stop.delay = 0;
        }
        info!(stops = self.rows.len(), "reset all delays");

        self.schedule_save();

        true
    }

    /// Ends the session, sending any pending changes first.
    pub async fn close(self) -> SaveStatus {
        self.autosave.close().await
    }

    fn push_row(&mut self, stop: Stop) -> RowId {
        let id = RowId(self.next_row);
        self.next_row += 1;
        self.rows.push(StopRow { id, stop });

        id
    }

    fn position(&self, row: RowId) -> Result<usize, EditError> {
        self.rows
            .iter()
            .position(|r| r.id == row)
            .ok_or(EditError::UnknownRow(row))
    }

    fn stop_mut(&mut self, row: RowId) -> Result<&mut Stop, EditError> {
        let position = self.position(row)?;
        Ok(&mut self.rows[position].stop)
    }

    fn schedule_save(&self) {
        self.autosave.schedule(self.stops());
    }
}
