//! `tokens check`: make sure every tenant has a usable access token.

use anyhow::Context;
use chrono::{DateTime, Utc};
use erpsync_core::CredentialGateway;

use crate::jobs::JobContext;

/// Loads each tenant's token, refreshing it when it is inside the refresh
/// margin, and prints when it expires.
///
/// # Errors
///
/// Returns an error naming the tenants whose token could not be obtained.
pub(crate) async fn run_check(ctx: &JobContext, requested: &[String]) -> anyhow::Result<()> {
    let tenants: Vec<String> = if requested.is_empty() {
        ctx.policy.tenants.iter().map(|t| t.name.clone()).collect()
    } else {
        requested.to_vec()
    };

    let mut failed = Vec::new();
    for tenant in &tenants {
        match check_tenant(ctx, tenant).await {
            Ok((expires_at, refreshed)) => {
                tracing::info!(tenant = %tenant, refreshed, ?expires_at, "token ok");
                match expires_at {
                    Some(at) => println!(
                        "{tenant}: ok, expires {}{}",
                        at.format("%Y-%m-%d %H:%M:%S UTC"),
                        if refreshed { " (refreshed)" } else { "" }
                    ),
                    None => println!("{tenant}: ok"),
                }
            }
            Err(e) => {
                tracing::error!(tenant = %tenant, error = %format!("{e:#}"), "token check failed");
                println!("{tenant}: FAILED ({e:#})");
                failed.push(tenant.clone());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("token check failed for: {}", failed.join(", "))
    }
}

/// Makes sure `tenant` has a valid token. Returns the stored expiry and
/// whether a refresh changed it.
async fn check_tenant(
    ctx: &JobContext,
    tenant: &str,
) -> anyhow::Result<(Option<DateTime<Utc>>, bool)> {
    let client = ctx.erp_client(tenant)?;
    let tokens = client.tokens();
    let before = tokens.gateway().load(tenant).await.ok().flatten();

    tokens.get_valid_token().await?;
    let after = tokens
        .gateway()
        .load(tenant)
        .await
        .context("failed to re-read the stored token")?;
    let expires_at = after.map(|r| r.expires_at);
    let refreshed = before.map(|r| r.expires_at) != expires_at;
    Ok((expires_at, refreshed))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const POLICY: &str = r#"
tenants:
  - name: PORTFIO
  - name: PORTCASA
"#;

    #[tokio::test]
    async fn store_failure_after_a_valid_token_does_not_stop_the_other_tenants() {
        let server = MockServer::start().await;
        // Serves the row twice, then the store goes away.
        Mock::given(method("GET"))
            .and(path("/rest/v1/integracoes_bling"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "nome_loja": "PORTFIO",
                "access_token": "token-1",
                "refresh_token": "refresh-1",
                "expires_at": "2099-01-01T00:00:00+00:00",
                "client_id": "client",
                "client_secret": "secret"
            }])))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/integracoes_bling"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let policy = serde_yaml::from_str(POLICY).unwrap();
        let ctx = JobContext::for_tests(&server.uri(), policy, false);

        let err = run_check(&ctx, &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "token check failed for: PORTFIO, PORTCASA");
    }
}
