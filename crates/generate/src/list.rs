//! List generator: a static inline list of parameter records.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use kuset_core::{KustomizationSet, ParamRecord, SetGenerator, SetTemplate};

use crate::Generator;

#[derive(Default)]
pub struct ListGenerator;

impl ListGenerator {
    pub fn new() -> Self {
        ListGenerator
    }
}

#[async_trait]
impl Generator for ListGenerator {
    async fn generate(
        &self,
        entry: &SetGenerator,
        _set: &KustomizationSet,
    ) -> Result<Option<Vec<ParamRecord>>> {
        let Some(config) = entry.list.as_ref() else {
            return Ok(None);
        };

        let mut records = Vec::with_capacity(config.elements.len());
        for (i, element) in config.elements.iter().enumerate() {
            match element.as_object() {
                Some(record) => records.push(record.clone()),
                None => bail!("list element {i} is not a JSON object: {element}"),
            }
        }
        Ok(Some(records))
    }

    fn interval(&self, _entry: &SetGenerator) -> Option<Duration> {
        None
    }

    fn template<'a>(&self, entry: &'a SetGenerator) -> Option<&'a SetTemplate> {
        entry.list.as_ref().and_then(|c| c.template.as_ref())
    }
}
