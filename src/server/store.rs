//! Routes kept in memory and mirrored to a JSON file after every change.
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;
use tracing::{Instrument, info, info_span};

use crate::model::{Route, RouteId, Stop};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RouteBook {
    #[serde(default)]
    routes: BTreeMap<RouteId, Route>,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("route {0} not found")]
    NotFound(RouteId),

    #[error("route {route_id} has no stop at index {index}")]
    BadIndex { route_id: RouteId, index: usize },

    #[error("error reading routes file {}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("error parsing routes file {}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("error writing routes file")]
    Write(#[from] io::Error),

    #[error("error encoding routes")]
    Encode(#[from] serde_json::Error),
}

pub struct RouteStore {
    path: Option<PathBuf>,
    book: RwLock<RouteBook>,
}

impl RouteStore {
    /// A store that is never written anywhere.
    pub fn in_memory() -> Self {
        RouteStore {
            path: None,
            book: RwLock::new(RouteBook::default()),
        }
    }

    /// Opens the routes file, starting empty when it doesn't exist yet.
    #[tracing::instrument(err)]
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let book = match tokio::fs::read(path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no routes file yet, starting empty");
                RouteBook::default()
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        info!("loaded {} routes", book.routes.len());

        Ok(RouteStore {
            path: Some(path.to_path_buf()),
            book: RwLock::new(book),
        })
    }

    pub async fn list(&self) -> Vec<Route> {
        self.book.read().await.routes.values().cloned().collect()
    }

    pub async fn get(&self, route_id: &RouteId) -> Option<Route> {
        self.book.read().await.routes.get(route_id).cloned()
    }

    /// Replaces every stop of an existing route, and its title when given.
    pub async fn replace_stops(
        &self,
        route_id: &RouteId,
        title: Option<String>,
        stops: Vec<Stop>,
    ) -> Result<(), StoreError> {
        self.mutate(|book| {
            let route = book.route_mut(route_id)?;
            if let Some(title) = title {
                route.title = title;
            }
            route.stops = stops.into_iter().map(clean_stop).collect();

            info!(%route_id, stops = route.stops.len(), "replaced stops");
            Ok(())
        })
        .await
    }

    /// Creates a route. Taken ids get a `-1`, `-2`... suffix, the id actually
    /// used is returned.
    pub async fn create(
        &self,
        id: RouteId,
        title: String,
        stops: Vec<Stop>,
    ) -> Result<RouteId, StoreError> {
        self.mutate(|book| {
            let mut route_id = id.clone();
            let mut suffix = 1;
            while book.routes.contains_key(&route_id) {
                route_id = RouteId::new(format!("{id}-{suffix}")).unwrap_or_else(|| id.clone());
                suffix += 1;
            }

            let route = Route {
                id: route_id.clone(),
                title,
                stops: stops.into_iter().map(clean_stop).collect(),
            };
            book.routes.insert(route_id.clone(), route);

            info!(%route_id, "created route");
            Ok(route_id)
        })
        .await
    }

    pub async fn add_stop(&self, route_id: &RouteId, stop: Stop) -> Result<(), StoreError> {
        self.mutate(|book| {
            book.route_mut(route_id)?.stops.push(clean_stop(stop));
            Ok(())
        })
        .await
    }

    pub async fn delete_stop(&self, route_id: &RouteId, index: usize) -> Result<Stop, StoreError> {
        self.mutate(|book| {
            let route = book.route_mut(route_id)?;
            if index >= route.stops.len() {
                return Err(StoreError::BadIndex {
                    route_id: route_id.clone(),
                    index,
                });
            }

            Ok(route.stops.remove(index))
        })
        .await
    }

    /// Applies `change` to a copy of the routes and writes it out while still
    /// holding the lock. The copy only replaces the shared routes once the
    /// file has it, so a failed write changes nothing.
    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut RouteBook) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut book = self.book.write().await;
        let mut changed = book.clone();
        let out = change(&mut changed)?;

        if let Some(path) = &self.path {
            let json = serde_json::to_vec_pretty(&changed)?;
            tokio::fs::write(path, json)
                .instrument(info_span!("Writing routes file"))
                .await?;
        }

        *book = changed;

        Ok(out)
    }
}

impl RouteBook {
    fn route_mut(&mut self, route_id: &RouteId) -> Result<&mut Route, StoreError> {
        self.routes
            .get_mut(route_id)
            .ok_or_else(|| StoreError::NotFound(route_id.clone()))
    }
}

fn clean_stop(stop: Stop) -> Stop {
    Stop {
        name: stop.name.trim().to_string(),
        ..stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RouteId {
        RouteId::new(s).unwrap()
    }

    #[tokio::test]
    async fn clashing_ids_get_suffixes() -> Result<(), anyhow::Error> {
        let store = RouteStore::in_memory();

        let first = store.create(id("line-33"), "Line 33".into(), vec![]).await?;
        let second = store.create(id("line-33"), "Line 33".into(), vec![]).await?;
        let third = store.create(id("line-33"), "Line 33".into(), vec![]).await?;

        assert_eq!(first, id("line-33"));
        assert_eq!(second, id("line-33-1"));
        assert_eq!(third, id("line-33-2"));

        Ok(())
    }

    #[tokio::test]
    async fn replacing_trims_names_and_keeps_order() -> Result<(), anyhow::Error> {
        let store = RouteStore::in_memory();
        let route_id = store.create(id("line-33"), "Line 33".into(), vec![]).await?;

        store
            .replace_stops(
                &route_id,
                None,
                vec![
                    Stop::new("  Bosweg ", Default::default(), 5),
                    Stop::new("Bergenlaan", Default::default(), 6),
                ],
            )
            .await?;

        let route = store.get(&route_id).await.unwrap();
        assert_eq!(route.title, "Line 33");
        assert_eq!(route.stops[0].name, "Bosweg");
        assert_eq!(route.stops[1].name, "Bergenlaan");

        Ok(())
    }

    #[tokio::test]
    async fn missing_routes_and_indexes_are_errors() -> Result<(), anyhow::Error> {
        let store = RouteStore::in_memory();
        let route_id = store.create(id("line-33"), "Line 33".into(), vec![]).await?;

        assert!(matches!(
            store.add_stop(&id("nope"), Stop::default()).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_stop(&route_id, 0).await,
            Err(StoreError::BadIndex { index: 0, .. })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn a_failed_write_leaves_the_routes_untouched() -> Result<(), anyhow::Error> {
        let dir = std::env::temp_dir().join(format!("routes-dir-{}", std::process::id()));
        let _ = tokio::fs::remove_dir_all(&dir).await;
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("routes.json");

        let store = RouteStore::load(&path).await?;
        let route_id = store
            .create(id("line-33"), "Line 33".into(), vec![Stop::default()])
            .await?;

        // a directory where the file should be makes every write fail
        tokio::fs::remove_file(&path).await?;
        tokio::fs::create_dir(&path).await?;

        let result = store
            .replace_stops(&route_id, Some("Line 33 night".into()), vec![])
            .await;
        tokio::fs::remove_dir_all(&dir).await?;

        assert!(matches!(result, Err(StoreError::Write(_))));
        let route = store.get(&route_id).await.unwrap();
        assert_eq!(route.title, "Line 33");
        assert_eq!(route.stops.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn routes_survive_a_reload() -> Result<(), anyhow::Error> {
        let path = std::env::temp_dir().join(format!("routes-{}.json", std::process::id()));
        let _ = tokio::fs::remove_file(&path).await;

        let store = RouteStore::load(&path).await?;
        let route_id = store
            .create(id("line-33"), "Line 33".into(), vec![Stop::default()])
            .await?;
        store.add_stop(&route_id, Stop::new("Bosweg", Default::default(), 2)).await?;

        let reloaded = RouteStore::load(&path).await?;
        let route = reloaded.get(&route_id).await.unwrap();
        tokio::fs::remove_file(&path).await?;

        assert_eq!(route.stops.len(), 2);
        assert_eq!(route.stops[1].delay, 2);

        Ok(())
    }
}
