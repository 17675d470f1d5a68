//! Eucalyptus provider speaking the EC2-compatible API through `rusoto_ec2`.

mod convert;
mod error;

use std::time::Duration;

use rusoto_core::{HttpClient, Region};
use rusoto_credential::StaticProvider;
use rusoto_ec2::{DescribeInstancesRequest, Ec2, Ec2Client};
use tracing::debug;

use crate::config::EucaConfig;
use crate::provision::{
    DEFAULT_POLL_INTERVAL, Provider, ProviderFuture, ServerInstance, ServerRequest,
};

pub use error::EucaError;

/// Provider that launches and polls servers on a Eucalyptus cloud.
#[derive(Clone)]
pub struct EucaProvider {
    client: Ec2Client,
    poll_interval: Duration,
}

impl EucaProvider {
    /// Constructs a provider from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EucaError::Config`] when the configuration fails validation,
    /// or [`EucaError::Client`] when the HTTP client cannot be created.
    pub fn new(config: &EucaConfig) -> Result<Self, EucaError> {
        config.validate()?;
        let http = HttpClient::new().map_err(|err| EucaError::Client(err.to_string()))?;
        let credentials = StaticProvider::new_minimal(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
        );
        let region = Region::Custom {
            name: config.region.clone(),
            endpoint: config.api_endpoint.clone(),
        };

        Ok(Self {
            client: Ec2Client::new_with(http, credentials, region),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }
}

impl std::fmt::Debug for EucaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EucaProvider")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Provider for EucaProvider {
    type Error = EucaError;

    fn create<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> ProviderFuture<'a, ServerInstance, Self::Error> {
        Box::pin(async move {
            let call = convert::run_instances_request(request);
            let reservation = self.client.run_instances(call).await?;
            let server = convert::server_from_reservation(reservation)?;
            debug!(instance_id = %server.id, state = %server.state, "launched instance");
            Ok(server)
        })
    }

    fn reload<'a>(
        &'a self,
        server: &'a ServerInstance,
    ) -> ProviderFuture<'a, ServerInstance, Self::Error> {
        Box::pin(async move {
            let result = self
                .client
                .describe_instances(DescribeInstancesRequest {
                    instance_ids: Some(vec![server.id.clone()]),
                    ..DescribeInstancesRequest::default()
                })
                .await?;
            let snapshot =
                convert::find_instance(result.reservations.unwrap_or_default(), &server.id)?;
            debug!(instance_id = %snapshot.id, state = %snapshot.state, "reloaded instance");
            Ok(snapshot)
        })
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::test_support::euca_config;

    #[test]
    fn new_rejects_missing_credentials() {
        let mut config = euca_config();
        config.secret_access_key = String::new();

        let err = EucaProvider::new(&config).expect_err("blank secret should be rejected");

        let expected = EucaError::from(ConfigError::MissingField(String::from(
            "missing Eucalyptus secret access key: set EUCA_SECRET_ACCESS_KEY or add \
             secret_access_key to [euca] in knife-euca.toml",
        )));
        assert_eq!(err, expected);
    }

    #[test]
    fn new_polls_every_second() {
        let provider = EucaProvider::new(&euca_config()).expect("config should validate");
        assert_eq!(provider.poll_interval(), Duration::from_secs(1));
    }
}
