use std::collections::HashMap;
use std::sync::Arc;

use cdc_stage_common::{CdcStageError, Result};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::ClientConfig;
use tracing::debug;

use super::KafkaSource;
use crate::datasource::CommitPolicy;

pub type ConnectionOpts = HashMap<String, String>;

/// The configuration for a [`KafkaSource`]
#[derive(Debug)]
pub struct KafkaReadConfig {
    pub topic: String,
    pub bootstrap_servers: String,
    pub group_id: String,
    pub commit_policy: CommitPolicy,

    pub kafka_connection_opts: ConnectionOpts,
}

impl KafkaReadConfig {
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();

        let auto_commit = match self.commit_policy {
            CommitPolicy::AfterStage => "false",
            CommitPolicy::OnPoll => "true",
        };
        client_config
            .set("bootstrap.servers", self.bootstrap_servers.to_string())
            .set("group.id", self.group_id.to_string())
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", auto_commit);

        for (key, value) in self.kafka_connection_opts.clone().into_iter() {
            client_config.set(key, value);
        }

        client_config
    }

    pub fn make_consumer(&self) -> Result<StreamConsumer> {
        let consumer: StreamConsumer = self
            .client_config()
            .create()
            .map_err(|err| CdcStageError::KafkaConfig(format!("Consumer creation failed: {err}")))?;
        Ok(consumer)
    }
}

#[derive(Debug)]
pub struct KafkaSourceBuilder {
    bootstrap_servers: String,
    topic: Option<String>,
    group_id: Option<String>,
    commit_policy: CommitPolicy,
}

impl KafkaSourceBuilder {
    pub fn new(bootstrap_servers: String) -> Self {
        Self {
            bootstrap_servers,
            topic: None,
            group_id: None,
            commit_policy: CommitPolicy::default(),
        }
    }

    pub fn with_topic(&mut self, topic: String) -> &mut Self {
        self.topic = Some(topic);
        self
    }

    /// Concurrent runs against different topics must not share a group id.
    pub fn with_group_id(&mut self, group_id: String) -> &mut Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_commit_policy(&mut self, commit_policy: CommitPolicy) -> &mut Self {
        self.commit_policy = commit_policy;
        self
    }

    pub fn build_config(&self, opts: ConnectionOpts) -> Result<KafkaReadConfig> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(create_error("bootstrap_servers required"));
        }
        let topic = self
            .topic
            .as_ref()
            .filter(|topic| !topic.is_empty())
            .ok_or_else(|| create_error("topic required"))?
            .clone();

        let group_id = self
            .group_id
            .clone()
            .unwrap_or_else(|| default_group_id(&topic));

        Ok(KafkaReadConfig {
            topic,
            bootstrap_servers: self.bootstrap_servers.clone(),
            group_id,
            commit_policy: self.commit_policy,
            kafka_connection_opts: opts,
        })
    }

    /// Creates the consumer and subscribes it to the topic.
    pub fn build_source(&self, opts: ConnectionOpts) -> Result<KafkaSource> {
        let config = self.build_config(opts)?;
        let consumer = config.make_consumer()?;
        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|err| create_error(&format!("Subscription failed: {err}")))?;
        debug!(
            "subscribed to {} as group {}",
            config.topic, config.group_id
        );
        Ok(KafkaSource::new(Arc::new(config), consumer))
    }
}

pub fn default_group_id(topic: &str) -> String {
    format!("cdc-stage-{topic}")
}

fn create_error(msg: &str) -> CdcStageError {
    CdcStageError::KafkaConfig(msg.to_string())
}
