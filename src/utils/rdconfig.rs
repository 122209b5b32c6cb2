// src/utils/rdconfig.rs
use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::OnceCell;

/// One multiplexed connection per client, opened on first use.
///
/// Concurrent first callers share a single connect attempt. A failed attempt
/// is not cached; the next caller tries again.
pub struct RedisConnector {
    client: Client,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisConnector {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            connection: OnceCell::new(),
        }
    }

    pub async fn get_redis_connection(&self) -> redis::RedisResult<MultiplexedConnection> {
        self.connection
            .get_or_try_init(|| async {
                tracing::debug!("opening redis connection");
                self.client.get_multiplexed_async_connection().await
            })
            .await
            .cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }
}
