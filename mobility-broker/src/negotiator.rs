//! The Spec Negotiator (§4.E): queries every service's `/spec`, validates
//! the declared ⊇ required closure, and builds the directory + subscription
//! registry as a single setup transaction.

use std::collections::BTreeSet;

use mobility_wire::{MessageReply, ServiceSetup, ServiceSpec, SetupError};

use crate::directory::{Directory, ServiceDescriptor};
use crate::registry::SubscriptionRegistry;

/// Runs §4.E's five-step negotiation. On any failure, every service already
/// told `/setup` in this call is rolled back with `/finish` before the
/// error is returned — setup is a single transaction from the client's
/// perspective.
pub async fn negotiate(
    client: &reqwest::Client,
    services: &[ServiceSetup],
) -> Result<(Directory, SubscriptionRegistry), SetupError> {
    if services.is_empty() {
        return Err(SetupError::Malformed("no services configured".into()));
    }

    let specs = futures::future::join_all(services.iter().map(|s| fetch_spec(client, s))).await;
    let specs: Vec<(&ServiceSetup, ServiceSpec)> = specs.into_iter().collect::<Result<_, _>>()?;

    assert_schema_versions_match(&specs)?;
    assert_subscription_closure(&specs)?;

    let mut directory = Directory::new();
    let mut registry = SubscriptionRegistry::new();
    for (setup, spec) in &specs {
        for event_type in spec.consumed_types() {
            registry.subscribe(event_type, &setup.endpoint);
        }
        directory.insert(ServiceDescriptor {
            name: setup.name.clone(),
            endpoint: setup.endpoint.clone(),
            spec: spec.clone(),
            writer_url: setup.writer_url.clone(),
        });
    }

    let mut configured = Vec::new();
    for setup in services {
        match post_setup(client, setup).await {
            Ok(()) => configured.push(setup),
            Err(err) => {
                roll_back(client, &configured).await;
                return Err(err);
            }
        }
    }

    Ok((directory, registry))
}

async fn fetch_spec<'a>(
    client: &reqwest::Client,
    setup: &'a ServiceSetup,
) -> Result<(&'a ServiceSetup, ServiceSpec), SetupError> {
    let url = format!("{}/spec", setup.endpoint.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| SetupError::ServiceUnreachable {
            name: setup.name.clone(),
            source: e.into(),
        })?;
    let spec = response
        .error_for_status()
        .map_err(|e| SetupError::ServiceUnreachable {
            name: setup.name.clone(),
            source: e.into(),
        })?
        .json::<ServiceSpec>()
        .await
        .map_err(|e| SetupError::ServiceUnreachable {
            name: setup.name.clone(),
            source: e.into(),
        })?;
    Ok((setup, spec))
}

fn assert_schema_versions_match(specs: &[(&ServiceSetup, ServiceSpec)]) -> Result<(), SetupError> {
    let Some((first_setup, first_spec)) = specs.first() else {
        return Ok(());
    };
    for (setup, spec) in &specs[1..] {
        if spec.version != first_spec.version {
            return Err(SetupError::SpecVersionMismatch {
                a_name: first_setup.name.clone(),
                a_version: first_spec.version.clone(),
                b_name: setup.name.clone(),
                b_version: spec.version.clone(),
            });
        }
    }
    Ok(())
}

/// §4.E.3: for every (consumer, event_type, required_field), the union of
/// `declared` across all producers of that type must be a superset.
fn assert_subscription_closure(specs: &[(&ServiceSetup, ServiceSpec)]) -> Result<(), SetupError> {
    for (consumer_setup, consumer_spec) in specs {
        for event in &consumer_spec.events {
            if event.required.is_empty() {
                continue;
            }
            let declared_union: BTreeSet<String> = specs
                .iter()
                .flat_map(|(_, spec)| spec.declared_fields(&event.event_type))
                .collect();
            for field in &event.required {
                if !declared_union.contains(field) {
                    return Err(SetupError::UnsatisfiedFeature {
                        consumer: consumer_setup.name.clone(),
                        event_type: event.event_type.as_str().to_string(),
                        field: field.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

async fn post_setup(client: &reqwest::Client, setup: &ServiceSetup) -> Result<(), SetupError> {
    let url = format!("{}/setup", setup.endpoint.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(&setup.config)
        .send()
        .await
        .map_err(|e| SetupError::ServiceUnreachable {
            name: setup.name.clone(),
            source: e.into(),
        })?;
    response
        .error_for_status()
        .map_err(|e| SetupError::ServiceUnreachable {
            name: setup.name.clone(),
            source: e.into(),
        })?
        .json::<MessageReply>()
        .await
        .map_err(|e| SetupError::ServiceUnreachable {
            name: setup.name.clone(),
            source: e.into(),
        })?;
    Ok(())
}

async fn roll_back(client: &reqwest::Client, configured: &[&ServiceSetup]) {
    for setup in configured {
        let url = format!("{}/finish", setup.endpoint.trim_end_matches('/'));
        if let Err(err) = client.post(&url).send().await {
            tracing::warn!(service = %setup.name, error = %err, "rollback /finish failed");
        }
    }
}
