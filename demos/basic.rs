use scanapi_http::{CancellationToken, DomainError, ScanApiClient, ScanApiError};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let api = ScanApiClient::from_env()?;

    let submitted: Value = api
        .post("scan", &json!({ "url": "https://example.com", "visibility": "private" }))
        .await?;
    println!("submitted: {submitted}");

    let cancel = CancellationToken::new();
    match api.get_with_cancel::<Value>("result/unknown-id", &cancel).await {
        Ok(result) => println!("result: {result}"),
        Err(ScanApiError::Domain(DomainError::NotFound { message })) => {
            println!("not ready yet: {message}")
        }
        Err(ScanApiError::Domain(DomainError::RateLimited { retry_after, .. })) => {
            println!("rate limited, server asks to wait {retry_after:?}")
        }
        Err(ScanApiError::Cancelled) => println!("cancelled"),
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
