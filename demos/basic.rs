use ratelimit_retry::{CancellationToken, RateLimitedClient, RequestEnvelope};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let org_url = std::env::var("OKTA_ORG_URL")?;
    let token = std::env::var("OKTA_API_TOKEN")?;

    let client = RateLimitedClient::from_env()?.with_authorization(token)?;

    let url = format!("{}/api/v1/users?limit=25", org_url.trim_end_matches('/')).parse()?;
    let response = client
        .send(RequestEnvelope::get(url), &CancellationToken::new())
        .await?;

    println!("{} ({} bytes)", response.status(), response.body().len());
    if let Some(remaining) = response.headers().get("x-rate-limit-remaining") {
        println!("rate limit remaining: {}", remaining.to_str()?);
    }

    Ok(())
}
