use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use log::debug;

use crate::{
    data::{DataPoint, Instance, MutationType, Setup},
    error::MishmashError,
};

use super::{Cursor, Store};

/// Points grouped by the instance they were written to.
///
/// Only targets naming a single instance can be resolved.
#[derive(Debug, Default)]
pub struct MemoryStore {
    instances: Mutex<HashMap<Instance, Vec<DataPoint>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, instance: Instance, point: DataPoint) -> Result<(), MishmashError> {
        self.lock()?.entry(instance).or_default().push(point);
        Ok(())
    }

    pub fn points(&self, instance: &Instance) -> Result<Vec<DataPoint>, MishmashError> {
        Ok(self.lock()?.get(instance).cloned().unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Instance, Vec<DataPoint>>>, MishmashError> {
        self.instances
            .lock()
            .map_err(|_| MishmashError::Internal("store lock poisoned".to_string()))
    }
}

fn target(setup: &Setup) -> Result<&Instance, MishmashError> {
    setup.single_instance().ok_or_else(|| {
        MishmashError::Unimplemented("only single instance targets can be resolved".to_string())
    })
}

struct Snapshot(std::vec::IntoIter<DataPoint>);

#[async_trait]
impl Cursor for Snapshot {
    async fn next(&mut self) -> Result<Option<DataPoint>, MishmashError> {
        Ok(self.0.next())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn open(&self, setup: &Setup) -> Result<Box<dyn Cursor>, MishmashError> {
        let points = self.points(target(setup)?)?;
        debug!("opened cursor over {} point(s)", points.len());
        Ok(Box::new(Snapshot(points.into_iter())))
    }

    async fn write(&self, setup: &Setup, point: DataPoint) -> Result<(), MishmashError> {
        let instance = target(setup)?.clone();
        let mut instances = self.lock()?;
        let points = instances.entry(instance).or_default();

        match setup.mutation_type.unwrap_or_default() {
            MutationType::Append => points.push(point),
            MutationType::Overwrite => {
                match points.iter_mut().find(|p| p.keys() == point.keys()) {
                    Some(existing) => *existing = point,
                    None => points.push(point),
                }
            }
        }
        Ok(())
    }
}
