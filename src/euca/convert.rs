//! Conversions between `rusoto_ec2` payloads and provider-neutral types.

use rusoto_ec2::{GroupIdentifier, Instance, Placement, Reservation, RunInstancesRequest};

use super::EucaError;
use crate::provision::{ServerInstance, ServerRequest};

/// Builds the `RunInstances` call for a single server.
pub(super) fn run_instances_request(request: &ServerRequest) -> RunInstancesRequest {
    RunInstancesRequest {
        image_id: request.image_id.clone(),
        instance_type: request.flavor_id.clone(),
        key_name: request.key_name.clone(),
        security_groups: (!request.groups.is_empty()).then(|| request.groups.clone()),
        placement: request.availability_zone.as_ref().map(|zone| Placement {
            availability_zone: Some(zone.clone()),
            ..Placement::default()
        }),
        min_count: 1,
        max_count: 1,
        ..RunInstancesRequest::default()
    }
}

/// Converts the first instance of a reservation.
///
/// Eucalyptus reports security groups on the reservation rather than on each
/// instance, so those are used when the instance carries none.
pub(super) fn server_from_reservation(
    reservation: Reservation,
) -> Result<ServerInstance, EucaError> {
    let groups = group_names(reservation.groups.as_deref());
    let instance = reservation
        .instances
        .and_then(|instances| instances.into_iter().next())
        .ok_or(EucaError::EmptyReservation)?;
    server_from_instance(instance, groups)
}

/// Finds `instance_id` among `reservations`.
pub(super) fn find_instance(
    reservations: Vec<Reservation>,
    instance_id: &str,
) -> Result<ServerInstance, EucaError> {
    for reservation in reservations {
        let groups = group_names(reservation.groups.as_deref());
        let found = reservation.instances.into_iter().flatten().find(|instance| {
            instance.instance_id.as_deref() == Some(instance_id)
        });
        if let Some(instance) = found {
            return server_from_instance(instance, groups);
        }
    }

    Err(EucaError::InstanceNotFound {
        instance_id: instance_id.to_owned(),
    })
}

fn server_from_instance(
    instance: Instance,
    reservation_groups: Vec<String>,
) -> Result<ServerInstance, EucaError> {
    let id = instance.instance_id.ok_or(EucaError::EmptyReservation)?;
    let instance_groups = group_names(instance.security_groups.as_deref());
    let groups = if instance_groups.is_empty() {
        reservation_groups
    } else {
        instance_groups
    };

    Ok(ServerInstance {
        id,
        flavor_id: instance.instance_type,
        image_id: instance.image_id,
        availability_zone: instance
            .placement
            .and_then(|placement| placement.availability_zone),
        groups,
        key_name: instance.key_name,
        dns_name: non_blank(instance.public_dns_name),
        private_dns_name: non_blank(instance.private_dns_name),
        public_ip_address: non_blank(instance.public_ip_address),
        private_ip_address: non_blank(instance.private_ip_address),
        state: instance
            .state
            .and_then(|state| state.name)
            .unwrap_or_default(),
    })
}

fn group_names(groups: Option<&[GroupIdentifier]>) -> Vec<String> {
    groups
        .unwrap_or_default()
        .iter()
        .filter_map(|group| group.group_name.clone().or_else(|| group.group_id.clone()))
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
