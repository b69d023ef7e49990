// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Wattline.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use super::ValueStore;
use crate::errors::StoreResult;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use wattline_types::{ComponentKey, CorrectedState, DeliveryQuality};

/// One outbound message of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Value,
    pub quality: DeliveryQuality,
}

/// Outbound side of a message bus
pub trait BusPublisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &Value, quality: DeliveryQuality) -> StoreResult<()>;

    /// Publish every message of one component commit.
    ///
    /// The default sends them one by one, so subscribers only get per-topic
    /// ordering. Publishers that can apply a batch as a unit override this.
    fn publish_batch(&self, messages: &[BusMessage]) -> StoreResult<()> {
        for message in messages {
            self.publish(&message.topic, &message.payload, message.quality)?;
        }
        Ok(())
    }
}

/// Bus backend. Each field goes to `<prefix>/<class segment>/<id>/get/<field>`
/// with the delivery quality the field asks for.
pub struct BusValueStore {
    key: ComponentKey,
    base_topic: String,
    publisher: Arc<dyn BusPublisher>,
    staged: Option<CorrectedState>,
}

impl std::fmt::Debug for BusValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusValueStore")
            .field("key", &self.key)
            .field("base_topic", &self.base_topic)
            .finish_non_exhaustive()
    }
}

impl BusValueStore {
    pub fn new(prefix: &str, key: ComponentKey, publisher: Arc<dyn BusPublisher>) -> Self {
        Self {
            key,
            base_topic: format!(
                "{}/{}/{}/get",
                prefix.trim_end_matches('/'),
                key.class.topic_segment(),
                key.id
            ),
            publisher,
            staged: None,
        }
    }

    pub fn topic(&self, field: &str) -> String {
        format!("{}/{}", self.base_topic, field)
    }
}

impl ValueStore for BusValueStore {
    fn key(&self) -> ComponentKey {
        self.key
    }

    fn set(&mut self, state: CorrectedState) {
        self.staged = Some(state);
    }

    fn update(&mut self) -> StoreResult<()> {
        let Some(state) = &self.staged else {
            return Ok(());
        };
        let messages: Vec<BusMessage> = state
            .fields()
            .into_iter()
            .map(|field| BusMessage {
                topic: self.topic(field.name),
                payload: field.value,
                quality: field.quality,
            })
            .collect();
        self.publisher.publish_batch(&messages)
    }

    fn staged(&self) -> Option<&CorrectedState> {
        self.staged.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedValue {
    pub payload: Value,
    pub quality: DeliveryQuality,
}

/// In-process bus keeping the last value per topic, like a retained broker topic
#[derive(Debug, Default)]
pub struct RetainedBus {
    topics: RwLock<BTreeMap<String, PublishedValue>>,
}

impl RetainedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, topic: &str) -> Option<PublishedValue> {
        self.topics.read().get(topic).cloned()
    }

    /// Every retained value under `prefix`, read under one lock
    pub fn snapshot(&self, prefix: &str) -> BTreeMap<String, PublishedValue> {
        self.topics
            .read()
            .iter()
            .filter(|(topic, _)| topic.starts_with(prefix))
            .map(|(topic, value)| (topic.clone(), value.clone()))
            .collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.topics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.read().is_empty()
    }
}

impl BusPublisher for RetainedBus {
    fn publish(&self, topic: &str, payload: &Value, quality: DeliveryQuality) -> StoreResult<()> {
        self.topics.write().insert(
            topic.to_owned(),
            PublishedValue {
                payload: payload.clone(),
                quality,
            },
        );
        Ok(())
    }

    fn publish_batch(&self, messages: &[BusMessage]) -> StoreResult<()> {
        let mut topics = self.topics.write();
        for message in messages {
            topics.insert(
                message.topic.clone(),
                PublishedValue {
                    payload: message.payload.clone(),
                    quality: message.quality,
                },
            );
        }
        Ok(())
    }
}
