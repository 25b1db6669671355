//! Applies normalized registration events to the directory.

use herald_common::directory::RecipientDirectory;
use herald_common::error::AppError;
use herald_common::types::{Recipient, RecipientUpdate};
use herald_decoders::normalize::RegistrationEvent;

/// Apply one registration event.
///
/// `Added` creates the recipient when it is unknown (a wallet address is then
/// required) and otherwise refreshes the fields it carries. The other events
/// only touch recipients that already exist.
pub async fn apply_registration(
    directory: &dyn RecipientDirectory,
    event: RegistrationEvent,
) -> Result<(), AppError> {
    let id = event.recipient_id();

    match event {
        RegistrationEvent::Added {
            wallet_address,
            display_name,
            target,
            ..
        } => match directory.get_by_id(id).await? {
            Some(mut existing) => {
                if let Some(address) = wallet_address {
                    existing.wallet_address = address;
                }
                existing.apply(&RecipientUpdate {
                    display_name,
                    notifications_enabled: target.as_ref().map(|_| true),
                    delivery: target.map(Some),
                    ..Default::default()
                });
                directory.upsert(&existing).await?;
            }
            None => {
                let wallet_address = wallet_address.ok_or_else(|| {
                    AppError::Validation(format!(
                        "recipient {} cannot be created without a wallet address",
                        id
                    ))
                })?;
                let recipient = Recipient {
                    id,
                    wallet_address,
                    display_name: display_name.unwrap_or_default(),
                    delivery_endpoint: target.as_ref().map(|t| t.endpoint().to_string()),
                    delivery_token: target.as_ref().map(|t| t.token().to_string()),
                    notifications_enabled: target.is_some(),
                    battle_royale_notifications_enabled: true,
                    last_notified_at: None,
                };
                directory.upsert(&recipient).await?;
            }
        },
        RegistrationEvent::Removed { .. } | RegistrationEvent::NotificationsDisabled { .. } => {
            directory
                .update(
                    id,
                    &RecipientUpdate {
                        delivery: Some(None),
                        notifications_enabled: Some(false),
                        ..Default::default()
                    },
                )
                .await?;
        }
        RegistrationEvent::NotificationsEnabled { target, .. } => {
            directory
                .update(
                    id,
                    &RecipientUpdate {
                        delivery: Some(Some(target)),
                        notifications_enabled: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
        }
    }

    tracing::info!(recipient_id = id, "Registration event applied");
    Ok(())
}
