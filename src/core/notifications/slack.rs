use super::{JobEvent, NotificationChannel, human_size};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    fn format_message(&self, event: &JobEvent) -> serde_json::Value {
        let (title, _) = event.summary();

        let fields = match event {
            JobEvent::Started {
                job_id,
                source,
                endpoint,
                folder,
            } => vec![
                field("Job ID", &format!("`{}`", short_id(job_id))),
                field("Source", &format!("`{}`", source.display())),
                field("Share", &format!("`{}`", endpoint)),
                field("Folder", &format!("`{}`", folder)),
            ],
            JobEvent::Completed {
                job_id,
                endpoint,
                folder,
                files,
                total_bytes,
                duration_secs,
                exit_status,
            } => vec![
                field("Job ID", &format!("`{}`", short_id(job_id))),
                field("Destination", &format!("`{}/{}`", endpoint, folder)),
                field("Files", &format!("{} ({})", files, human_size(*total_bytes))),
                field(
                    "Duration",
                    &format!("{}s, exit status {}", duration_secs, exit_status),
                ),
            ],
            JobEvent::Failed {
                job_id, endpoint, ..
            } => vec![
                field("Job ID", &format!("`{}`", short_id(job_id))),
                field("Share", &format!("`{}`", endpoint)),
            ],
        };

        let mut blocks = vec![
            json!({
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": title,
                    "emoji": true
                }
            }),
            json!({
                "type": "section",
                "fields": fields
            }),
        ];

        if let JobEvent::Failed { error, .. } = event {
            blocks.push(json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!("*Error:*\n```{}```", error)
                }
            }));
        }

        json!({ "blocks": blocks })
    }
}

fn field(name: &str, value: &str) -> serde_json::Value {
    json!({
        "type": "mrkdwn",
        "text": format!("*{}:*\n{}", name, value)
    })
}

fn short_id(job_id: &str) -> &str {
    &job_id[..8.min(job_id.len())]
}

#[async_trait]
impl NotificationChannel for SlackNotifier {
    async fn notify(&self, event: JobEvent) -> Result<()> {
        let payload = self.format_message(&event);
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
