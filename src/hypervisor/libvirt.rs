//! libvirt backend (feature `libvirt`).
//!
//! Opens a read-only connection and fetches stats with one
//! `virDomainListGetStats` call per resource class for all listed domains.
//! Records are mapped back to the listed handles by uuid, so a domain that
//! vanished in between only loses its own records. Stats lists are freed
//! before `get_stats` returns; domain handles are freed when dropped.

use std::ffi::CStr;
use std::ptr;
use tracing::{debug, info};
use virt::connect::Connect;
use virt::domain::Domain;
use virt::sys;

use super::{
    match_records_by_uuid, Hypervisor, HypervisorError, Parameter, ResourceClass, StatsRecord,
    TypedValue,
};

/// Read-only libvirt connection.
pub struct LibvirtHypervisor {
    conn: Connect,
}

impl LibvirtHypervisor {
    /// Opens a read-only connection to `uri`.
    pub fn connect_read_only(uri: &str) -> Result<Self, HypervisorError> {
        let conn = Connect::open_read_only(Some(uri)).map_err(|e| HypervisorError::Connect {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        info!("Connected read-only to hypervisor at {}", uri);
        Ok(Self { conn })
    }
}

/// Owns a stats record list returned by libvirt.
struct RecordList(*mut sys::virDomainStatsRecordPtr);

impl Drop for RecordList {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: the pointer came from virDomainListGetStats and is freed once.
            unsafe { sys::virDomainStatsRecordListFree(self.0) };
        }
    }
}

fn stats_type(class: ResourceClass) -> u32 {
    match class {
        ResourceClass::Vcpu => sys::VIR_DOMAIN_STATS_VCPU as u32,
        ResourceClass::Interface => sys::VIR_DOMAIN_STATS_INTERFACE as u32,
        ResourceClass::Block => sys::VIR_DOMAIN_STATS_BLOCK as u32,
    }
}

/// Length of a formatted uuid plus the terminating NUL.
const UUID_STRING_BUFLEN: usize = 37;

/// UUID string of the domain a record belongs to.
fn record_uuid(record: &sys::virDomainStatsRecord) -> Option<String> {
    if record.dom.is_null() {
        return None;
    }
    let mut buf = [0 as std::os::raw::c_char; UUID_STRING_BUFLEN];
    // SAFETY: `record.dom` is a live handle owned by the record list and
    // `buf` has room for the formatted uuid.
    let rc = unsafe { sys::virDomainGetUUIDString(record.dom, buf.as_mut_ptr()) };
    if rc < 0 {
        return None;
    }
    // SAFETY: libvirt NUL-terminates the uuid on success.
    let uuid = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Some(uuid.to_string_lossy().into_owned())
}

/// Copies the typed parameters of a record into owned values.
///
/// # Safety
///
/// `record` must point into a live stats list.
unsafe fn copy_params(record: &sys::virDomainStatsRecord) -> Vec<Parameter> {
    if record.params.is_null() || record.nparams <= 0 {
        return Vec::new();
    }
    let raw = std::slice::from_raw_parts(record.params, record.nparams as usize);

    raw.iter()
        .filter_map(|p| {
            let field = CStr::from_ptr(p.field.as_ptr())
                .to_string_lossy()
                .into_owned();
            let kind = p.type_ as i64;
            let value = if kind == sys::VIR_TYPED_PARAM_INT as i64 {
                TypedValue::Int(p.value.i)
            } else if kind == sys::VIR_TYPED_PARAM_UINT as i64 {
                TypedValue::UInt(p.value.ui)
            } else if kind == sys::VIR_TYPED_PARAM_LLONG as i64 {
                TypedValue::LLong(p.value.l)
            } else if kind == sys::VIR_TYPED_PARAM_ULLONG as i64 {
                TypedValue::ULLong(p.value.ul)
            } else if kind == sys::VIR_TYPED_PARAM_DOUBLE as i64 {
                TypedValue::Double(p.value.d)
            } else if kind == sys::VIR_TYPED_PARAM_BOOLEAN as i64 {
                TypedValue::Boolean(p.value.b != 0)
            } else if kind == sys::VIR_TYPED_PARAM_STRING as i64 {
                if p.value.s.is_null() {
                    return None;
                }
                TypedValue::String(CStr::from_ptr(p.value.s).to_string_lossy().into_owned())
            } else {
                debug!("Skipping parameter {} with unknown type {}", field, kind);
                return None;
            };
            Some(Parameter::new(field, value))
        })
        .collect()
}

impl Hypervisor for LibvirtHypervisor {
    type Domain = Domain;

    fn list_active_domains(&self) -> Result<Vec<Domain>, HypervisorError> {
        self.conn
            .list_all_domains(sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE)
            .map_err(|e| HypervisorError::ListDomains(e.to_string()))
    }

    fn domain_name(&self, domain: &Domain) -> Result<String, HypervisorError> {
        domain
            .get_name()
            .map_err(|e| HypervisorError::Identity(e.to_string()))
    }

    fn domain_uuid(&self, domain: &Domain) -> Result<String, HypervisorError> {
        domain
            .get_uuid_string()
            .map_err(|e| HypervisorError::Identity(e.to_string()))
    }

    fn domain_metadata(
        &self,
        domain: &Domain,
        namespace: &str,
    ) -> Result<Option<String>, HypervisorError> {
        match domain.get_metadata(
            sys::VIR_DOMAIN_METADATA_ELEMENT as i32,
            Some(namespace),
            sys::VIR_DOMAIN_AFFECT_CURRENT as u32,
        ) {
            Ok(xml) => Ok(Some(xml)),
            Err(e) => {
                // libvirt reports missing metadata as an error.
                debug!("No metadata under {}: {}", namespace, e);
                Ok(None)
            }
        }
    }

    fn get_stats(
        &self,
        domains: &[Domain],
        class: ResourceClass,
    ) -> Result<Vec<StatsRecord>, HypervisorError> {
        if domains.is_empty() {
            return Ok(Vec::new());
        }

        let listed: Vec<Option<String>> = domains
            .iter()
            .enumerate()
            .map(|(index, domain)| match domain.get_uuid_string() {
                Ok(uuid) => Some(uuid),
                Err(e) => {
                    debug!("Domain #{} has no readable uuid: {}", index, e);
                    None
                }
            })
            .collect();

        let mut doms: Vec<sys::virDomainPtr> = domains.iter().map(|d| d.as_ptr()).collect();
        doms.push(ptr::null_mut());
        let mut list: *mut sys::virDomainStatsRecordPtr = ptr::null_mut();

        // SAFETY: `doms` is NULL-terminated and every handle outlives the call.
        let count = unsafe {
            sys::virDomainListGetStats(
                doms.as_mut_ptr(),
                stats_type(class) as _,
                &mut list,
                sys::VIR_CONNECT_GET_ALL_DOMAINS_STATS_NOWAIT as _,
            )
        };
        let list = RecordList(list);

        if count < 0 {
            return Err(HypervisorError::Stats {
                class,
                reason: format!("virDomainListGetStats failed for {} domains", domains.len()),
            });
        }

        let mut fetched = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            // SAFETY: libvirt returned `count` records in `list`.
            let record = unsafe { *list.0.add(i) };
            if record.is_null() {
                continue;
            }
            // SAFETY: `record` stays valid until `list` is dropped.
            let record = unsafe { &*record };
            fetched.push((record_uuid(record), unsafe { copy_params(record) }));
        }

        Ok(match_records_by_uuid(&listed, fetched, class))
    }
}
