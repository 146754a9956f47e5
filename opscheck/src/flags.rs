//! Feature-flag toggling for `opscheck flags`.

use std::time::Instant;

use anyhow::{Result, bail};
use tracing::{info, instrument, warn};

use crate::core::flags::effective;
use crate::core::record::ResultRecord;
use crate::io::flag_service::FlagService;

/// Set every flag in `names`, then read each one back.
///
/// One record per name, in order. A set call that errors, or a value that
/// does not read back as `enabled`, fails that flag's record only.
#[instrument(skip(service), fields(count = names.len()))]
pub fn toggle(
    service: &dyn FlagService,
    names: &[String],
    tenant: Option<&str>,
    enabled: bool,
) -> Vec<ResultRecord> {
    let mut records = Vec::with_capacity(names.len());
    for name in names {
        let started = Instant::now();
        let label = record_name(name, tenant, enabled);
        let record = match set_and_confirm(service, name, tenant, enabled) {
            Ok(()) => {
                info!(flag = %name, enabled, "flag confirmed");
                ResultRecord::pass(label).with_detail(format!("{name} = {enabled}"))
            }
            Err(err) => {
                warn!(flag = %name, err = %format!("{err:#}"), "flag toggle failed");
                ResultRecord::fail(label).with_detail(format!("{err:#}"))
            }
        };
        records.push(record.with_duration(started.elapsed()));
    }
    records
}

fn set_and_confirm(
    service: &dyn FlagService,
    name: &str,
    tenant: Option<&str>,
    enabled: bool,
) -> Result<()> {
    service.set(name, tenant, enabled)?;
    let flags = service.list(tenant)?;
    match effective(&flags, name, tenant) {
        Some(value) if value == enabled => Ok(()),
        Some(value) => bail!("{name} reads back as {value} after setting {enabled}"),
        None => bail!("{name} not found after setting it"),
    }
}

fn record_name(name: &str, tenant: Option<&str>, enabled: bool) -> String {
    let verb = if enabled { "enable" } else { "disable" };
    match tenant {
        Some(tenant) => format!("{verb} {name} for {tenant}"),
        None => format!("{verb} {name}"),
    }
}
