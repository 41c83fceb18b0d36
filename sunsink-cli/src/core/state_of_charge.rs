//! One-shot collection of the batteries' state of charge over a property subscription.

use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;
use serde::Deserialize;
use sunsink_quantities::Percent;

use crate::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatteryCharge {
    pub master: Percent,

    /// Extra battery packs, in the order of their slot numbers.
    pub slaves: Vec<Percent>,
}

#[derive(Default)]
pub struct StateOfChargeCollector {
    pending: BTreeSet<String>,
}

impl StateOfChargeCollector {
    const TOPIC_PREFIX: &'static str = "/app/device/property/";
    const MASTER_KEYS: [&'static str; 2] = ["bmsMaster.soc", "bms_bmsStatus.soc"];

    #[must_use]
    pub fn topic(serial_number: &str) -> String {
        format!("{}{serial_number}", Self::TOPIC_PREFIX)
    }

    /// Start a new collection round, forgetting the batteries that never reported in the last one.
    pub fn begin<'a>(&mut self, serial_numbers: impl IntoIterator<Item = &'a str>) {
        if !self.pending.is_empty() {
            warn!(pending = ?self.pending, "some batteries did not report the state of charge");
        }
        self.pending = serial_numbers.into_iter().map(ToOwned::to_owned).collect();
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Accept a property message.
    ///
    /// Returns the battery serial number and its charge once the message carries the master
    /// state of charge for a battery that has not reported in this round yet.
    pub fn accept(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<Option<(String, BatteryCharge)>> {
        let Some(serial_number) = topic.strip_prefix(Self::TOPIC_PREFIX) else {
            return Ok(None);
        };
        if !self.pending.contains(serial_number) {
            return Ok(None);
        }
        let message: PropertyMessage = serde_json::from_slice(payload)
            .with_context(|| format!("malformed property message from `{serial_number}`"))?;
        let Some(charge) = message.battery_charge() else {
            // Most property messages do not carry the state of charge.
            return Ok(None);
        };
        self.pending.remove(serial_number);
        Ok(Some((serial_number.to_owned(), charge)))
    }
}

#[derive(Deserialize)]
struct PropertyMessage {
    #[serde(default)]
    params: HashMap<String, serde_json::Value>,
}

impl PropertyMessage {
    fn battery_charge(&self) -> Option<BatteryCharge> {
        let master = StateOfChargeCollector::MASTER_KEYS
            .iter()
            .find_map(|key| self.percent(key))
            .filter(|percent| percent.0 > 0)?;
        let slaves = self
            .params
            .keys()
            .filter_map(|key| {
                let slot: u8 = key.strip_prefix("bmsSlave")?.strip_suffix(".soc")?.parse().ok()?;
                Some((slot, self.percent(key)?))
            })
            .sorted_unstable_by_key(|(slot, _)| *slot)
            .map(|(_, percent)| percent)
            .collect();
        Some(BatteryCharge { master, slaves })
    }

    fn percent(&self, key: &str) -> Option<Percent> {
        let value = self.params.get(key)?.as_u64()?;
        u16::try_from(value).ok().map(Percent)
    }
}
