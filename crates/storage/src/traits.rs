use async_trait::async_trait;
use domain::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{Query, Subscription};

/// Read/write view handed to a transaction body.
/// Reads see writes staged earlier in the same body.
pub trait Txn {
    fn get(&self, collection: &str, id: &str) -> Option<Value>;
    fn set(&mut self, collection: &str, id: &str, doc: Value);
    fn delete(&mut self, collection: &str, id: &str);
    fn generate_id(&mut self) -> String;
}

pub trait TxnExt {
    fn get_as<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>>;
    fn set_as<T: Serialize>(&mut self, collection: &str, id: &str, doc: &T) -> Result<()>;
    fn exists(&self, collection: &str, id: &str) -> bool;
}

impl<'a> TxnExt for dyn Txn + 'a {
    fn get_as<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.get(collection, id).map(decode).transpose()
    }

    fn set_as<T: Serialize>(&mut self, collection: &str, id: &str, doc: &T) -> Result<()> {
        self.set(collection, id, encode(doc)?);
        Ok(())
    }

    fn exists(&self, collection: &str, id: &str) -> bool {
        self.get(collection, id).is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Set {
        collection: String,
        id: String,
        doc: Value,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl Write {
    pub fn set<T: Serialize>(collection: &str, id: &str, doc: &T) -> Result<Self> {
        Ok(Write::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            doc: encode(doc)?,
        })
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        Write::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

/// Client contract of the remote document database.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    async fn query(&self, query: &Query) -> Result<Vec<Value>>;

    /// Delivers the full result set now and again after every relevant change.
    /// Dropping the subscription unsubscribes.
    fn subscribe(&self, query: Query) -> Subscription;

    /// Runs `body` atomically. An `Err` from the body commits nothing.
    async fn transaction<T, F>(&self, body: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnMut(&mut dyn Txn) -> Result<T> + Send + 'static;

    async fn batch(&self, writes: Vec<Write>) -> Result<()>;

    fn generate_id(&self) -> String;

    async fn get_as<T: DeserializeOwned + Send>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.get(collection, id).await?.map(decode).transpose()
    }

    async fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.get(collection, id).await?.is_some())
    }

    async fn query_as<T: DeserializeOwned + Send>(&self, query: &Query) -> Result<Vec<T>> {
        decode_all(self.query(query).await?)
    }
}

pub fn decode<T: DeserializeOwned>(doc: Value) -> Result<T> {
    Ok(serde_json::from_value(doc)?)
}

pub fn decode_all<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>> {
    docs.into_iter().map(decode).collect()
}

pub fn encode<T: Serialize>(doc: &T) -> Result<Value> {
    Ok(serde_json::to_value(doc)?)
}
