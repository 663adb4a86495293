use redis::aio::ConnectionManager;
use redis::RedisResult;
use tracing::info;

/// Opens the client and one shared `ConnectionManager`.
///
/// `ConnectionManager` is cheaply cloneable and reconnects on failure; all
/// clones share one multiplexed connection. The client is returned too so
/// callers can open dedicated connections for blocking commands.
pub async fn connect(url: &str) -> RedisResult<(redis::Client, ConnectionManager)> {
    let client = redis::Client::open(url)?;
    let conn = ConnectionManager::new(client.clone()).await?;

    let mut ping = conn.clone();
    let _: String = redis::cmd("PING").query_async(&mut ping).await?;

    info!(url = %redacted(url), "connected to redis");
    Ok((client, conn))
}

/// Strip credentials before a URL reaches the logs.
fn redacted(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_owned(),
    }
}
