//! End-to-end tests: real worker nodes on loopback, in-memory cache and store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use data_loader::{DataIndex, Movie, Rating};
use node_protocol::NodeServer;
use server::{
    DispatchMode, MemoryCache, MemoryStore, PersistOutcome, RecommendError,
    RecommendationService, ServiceConfig, Source,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Worker nodes that can be shut down mid-test
struct Cluster {
    addrs: Vec<String>,
    shutdown: Vec<oneshot::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl Cluster {
    async fn start(count: usize) -> Self {
        let mut cluster = Cluster {
            addrs: Vec::new(),
            shutdown: Vec::new(),
            handles: Vec::new(),
        };
        for _ in 0..count {
            let server = NodeServer::bind("127.0.0.1:0").await.unwrap();
            cluster.addrs.push(server.local_addr().unwrap().to_string());

            let (tx, rx) = oneshot::channel::<()>();
            cluster.shutdown.push(tx);
            cluster.handles.push(tokio::spawn(async move {
                server
                    .serve_with_shutdown(async move {
                        let _ = rx.await;
                    })
                    .await
                    .unwrap();
            }));
        }
        cluster
    }

    async fn stop(self) {
        for tx in self.shutdown {
            let _ = tx.send(());
        }
        for handle in self.handles {
            handle.await.unwrap();
        }
    }
}

/// 30 users over 20 movies with a fixed, uneven rating pattern
fn data_index() -> Arc<DataIndex> {
    let mut index = DataIndex::new();
    for movie_id in 1..=20u32 {
        index.insert_movie(Movie {
            id: movie_id,
            title: format!("Movie {} (2001)", movie_id),
            year: Some(2001),
            genres: vec![],
        });
    }
    for user_id in 1..=30u32 {
        for movie_id in 1..=20u32 {
            if (user_id * 7 + movie_id * 3) % 4 == 0 {
                continue;
            }
            index.insert_rating(Rating {
                user_id,
                movie_id,
                rating: 0.5 + ((user_id * movie_id) % 10) as f32 * 0.5,
                timestamp: 0,
            });
        }
    }
    index.build_secondary_indices();
    Arc::new(index)
}

fn service(
    data: Arc<DataIndex>,
    config: ServiceConfig,
) -> (RecommendationService, Arc<MemoryCache>, Arc<MemoryStore>) {
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryStore::new());
    let service = RecommendationService::new(data, config, cache.clone(), store.clone()).unwrap();
    (service, cache, store)
}

#[tokio::test]
async fn test_compute_persist_then_serve_from_cache() {
    let cluster = Cluster::start(3).await;
    let (service, cache, store) = service(data_index(), ServiceConfig::new(cluster.addrs.clone()));

    let first = service.recommend(4).await.unwrap();
    assert_eq!(first.source, Source::Computed);
    assert!(!first.items.is_empty());
    assert!(first.items.len() <= 10);
    let outcome = first.persistence.unwrap().await.unwrap();
    assert_eq!(outcome, PersistOutcome::Inserted);
    assert_eq!(store.len().await, 1);
    assert_eq!(cache.len().await, 1);

    // With every node gone, only the cache can answer
    cluster.stop().await;
    let second = service.recommend(4).await.unwrap();
    assert_eq!(second.source, Source::Cache);
    assert_eq!(second.items, first.items);
    assert!(second.persistence.is_none());
}

#[tokio::test]
async fn test_recommendations_exclude_rated_movies_and_stay_in_scale() {
    let cluster = Cluster::start(2).await;
    let data = data_index();
    let (service, _, _) = service(data.clone(), ServiceConfig::new(cluster.addrs.clone()));

    for user_id in [1, 9, 30] {
        let served = service.recommend(user_id).await.unwrap();
        let rated = data.user_vector(user_id).unwrap();
        for item in &served.items {
            assert!(!rated.contains_key(&item.movie_id));
            assert!((0.5..=5.0).contains(&item.predicted), "{:?}", item);
            assert!(item.title.is_some());
        }
        // predicted descending, movie id ascending on ties
        for pair in served.items.windows(2) {
            assert!(
                pair[0].predicted > pair[1].predicted
                    || (pair[0].predicted == pair[1].predicted
                        && pair[0].movie_id < pair[1].movie_id)
            );
        }
    }

    cluster.stop().await;
}

#[tokio::test]
async fn test_result_does_not_depend_on_node_count_or_dispatch() {
    let data = data_index();
    let mut results = Vec::new();

    for (nodes, dispatch) in [
        (1, DispatchMode::Sequential),
        (3, DispatchMode::Concurrent),
        (4, DispatchMode::Sequential),
    ] {
        let cluster = Cluster::start(nodes).await;
        let config = ServiceConfig::new(cluster.addrs.clone())
            .with_k(5)
            .with_dispatch(dispatch);
        let (service, _, _) = service(data.clone(), config);

        results.push(service.recommend(12).await.unwrap().items);
        cluster.stop().await;
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[tokio::test]
async fn test_concurrent_first_requests_store_one_record() {
    let cluster = Cluster::start(2).await;
    let (service, _, store) = service(data_index(), ServiceConfig::new(cluster.addrs.clone()));
    let service = Arc::new(service);

    let requests: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.recommend(17).await })
        })
        .collect();

    let mut answers = HashSet::new();
    let mut inserted = 0;
    for request in requests {
        let served = request.await.unwrap().unwrap();
        answers.insert(format!("{:?}", served.items));
        if let Some(persistence) = served.persistence {
            if persistence.await.unwrap() == PersistOutcome::Inserted {
                inserted += 1;
            }
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(store.len().await, 1);
    assert_eq!(answers.len(), 1);

    cluster.stop().await;
}

#[tokio::test]
async fn test_expired_cache_falls_back_to_store() {
    let cluster = Cluster::start(2).await;
    let config =
        ServiceConfig::new(cluster.addrs.clone()).with_cache_ttl(Duration::from_millis(250));
    let (service, cache, _) = service(data_index(), config);

    let first = service.recommend(3).await.unwrap();
    first.persistence.unwrap().await.unwrap();
    cluster.stop().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(cache.len().await, 0);

    let second = service.recommend(3).await.unwrap();
    assert_eq!(second.source, Source::Store);
    assert_eq!(second.items, first.items);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_node_failure_fails_request_and_stores_nothing() {
    let cluster = Cluster::start(1).await;
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut addrs = cluster.addrs.clone();
    addrs.push(dead.local_addr().unwrap().to_string());
    drop(dead);

    let config = ServiceConfig::new(addrs).with_node_timeout(Duration::from_secs(2));
    let (service, cache, store) = service(data_index(), config);

    let err = service.recommend(5).await.unwrap_err();
    assert!(matches!(err, RecommendError::Node { index: 1, .. }));
    assert_eq!(err.status_code(), 500);
    assert_eq!(cache.len().await, 0);
    assert_eq!(store.len().await, 0);

    cluster.stop().await;
}
