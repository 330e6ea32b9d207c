use std::time::Duration;

use monitor_adapters::Adapter;
use monitor_core::{Connection, ProviderConfig, Result};
use monitor_providers_gmail::{GmailAdapter, GmailConfig};
use monitor_providers_outlook::{OutlookAdapter, OutlookConfig};
use monitor_providers_slack::{SlackAdapter, SlackConfig};

/// Builds the provider-specific adapter for a monitor's `provider_config`,
/// dispatching on its tag (§4.3 step 3).
pub fn build_adapter(
    provider_config: &ProviderConfig,
    connection: &Connection,
    timeout: Duration,
) -> Result<Box<dyn Adapter>> {
    match provider_config {
        ProviderConfig::Slack {
            channel_ids,
            workspace_wide,
            tagged_user_ids,
            keywords,
            context_messages,
            my_mentions,
        } => {
            let config = SlackConfig {
                channel_ids: channel_ids.clone(),
                workspace_wide: *workspace_wide,
                tagged_user_ids: tagged_user_ids.clone(),
                keywords: keywords.clone(),
                context_messages: *context_messages,
                my_mentions: *my_mentions,
            };
            Ok(Box::new(SlackAdapter::new(connection, config, timeout)?))
        }
        ProviderConfig::Gmail {
            label_or_folder_ids,
            from_filter,
            keywords,
            include_body,
        } => {
            let config = GmailConfig {
                label_or_folder_ids: label_or_folder_ids.clone(),
                from_filter: from_filter.clone(),
                keywords: keywords.clone(),
                include_body: *include_body,
            };
            Ok(Box::new(GmailAdapter::new(connection, config, timeout)?))
        }
        ProviderConfig::Outlook {
            label_or_folder_ids,
            from_filter,
            keywords,
            include_body,
        } => {
            let config = OutlookConfig {
                label_or_folder_ids: label_or_folder_ids.clone(),
                from_filter: from_filter.clone(),
                keywords: keywords.clone(),
                include_body: *include_body,
            };
            Ok(Box::new(OutlookAdapter::new(connection, config, timeout)?))
        }
    }
}
