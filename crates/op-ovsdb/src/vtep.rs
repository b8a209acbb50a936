//! `hardware_vtep` helpers: logical switches, remote MAC entries, physical
//! switch ports and VLAN bindings.
//!
//! Lookups go through the row cache by name, then each request is one
//! transaction. Reference columns are read as sets so both the scalar and
//! the one-element-set forms a server may send decode the same way.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::notation::{Condition, Mutation, OvsMap, OvsSet, Row, RowUuid};
use crate::operation::Operation;
use crate::outcome::Outcome;
use crate::relational::{build_insert_and_link, ConfigService};
use crate::tables::{Database, Table};
use crate::transact::TransactBuilder;

/// Tunnel encapsulation written into new physical locators
pub const VXLAN_OVER_IPV4: &str = "vxlan_over_ipv4";

const MAC_TABLES: [Table; 4] = [
    Table::UcastMacsLocal,
    Table::UcastMacsRemote,
    Table::McastMacsLocal,
    Table::McastMacsRemote,
];

/// MAC written for entries that flood unknown destinations
pub const UNKNOWN_DST: &str = "unknown-dst";

const NEW_LOCATOR: &str = "new_pl";
const NEW_LOCATOR_SET: &str = "new_pls";
const NEW_UCAST_MAC: &str = "new_ucast_mac";
const NEW_MCAST_MAC: &str = "new_mcast_mac";

fn string_column(row: &Row, column: &str) -> Option<String> {
    row.get::<String>(column).ok().flatten()
}

/// Reference column as a set, empty when absent or malformed
fn uuid_column(row: &Row, column: &str) -> OvsSet<RowUuid> {
    match row.get::<OvsSet<RowUuid>>(column) {
        Ok(set) => set.unwrap_or_default(),
        Err(e) => {
            warn!("Unreadable {} column: {}", column, e);
            OvsSet::new()
        }
    }
}

fn references(row: &Row, column: &str, uuid: &RowUuid) -> bool {
    uuid_column(row, column).contains(uuid)
}

fn mac_matches(row: &Row, mac: &str) -> bool {
    string_column(row, "MAC").is_some_and(|m| m.eq_ignore_ascii_case(mac))
}

/// `None` matches rows without an address, or with an empty one
fn ipaddr_matches(row: &Row, mac_ip: Option<&str>) -> bool {
    let ipaddr = string_column(row, "ipaddr").filter(|ip| !ip.is_empty());
    ipaddr.as_deref() == mac_ip
}

fn binding_operation(port: &RowUuid, vlan: u16, logical_switch: RowUuid) -> Operation {
    let binding: OvsMap<i64, RowUuid> = [(i64::from(vlan), logical_switch)].into_iter().collect();
    Operation::mutate(
        Table::PhysicalPort.name(),
        vec![Condition::uuid_equals(port)],
        vec![Mutation::insert("vlan_bindings", &binding)],
    )
}

/// Insert a one-locator set and a remote multicast entry flooding to it.
/// Returns the index of the multicast insert.
fn push_mcast_remote(
    tx: &mut TransactBuilder,
    logical_switch: &RowUuid,
    mac: &str,
    locator: &RowUuid,
    set_name: &str,
    mac_name: &str,
) -> usize {
    tx.add_operation(Operation::insert_named(
        Table::PhysicalLocatorSet.name(),
        set_name,
        Row::new().with("locators", &OvsSet::single(locator.clone())),
    ));
    tx.add_operation(Operation::insert_named(
        Table::McastMacsRemote.name(),
        mac_name,
        Row::new()
            .with("MAC", &mac.to_string())
            .with("locator_set", &OvsSet::single(RowUuid::named(set_name)))
            .with("logical_switch", &OvsSet::single(logical_switch.clone())),
    ))
}

/// VLAN bound to a logical switch on one physical port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanBinding {
    pub port: RowUuid,
    pub vlan: u16,
}

/// Physical locator to use for a new MAC entry
enum Locator {
    Existing(RowUuid),
    Created(RowUuid),
}

impl Locator {
    fn uuid(&self) -> &RowUuid {
        match self {
            Locator::Existing(uuid) | Locator::Created(uuid) => uuid,
        }
    }
}

impl ConfigService {
    pub fn find_logical_switch(&self, name: &str) -> Option<RowUuid> {
        self.find_by_name(Table::LogicalSwitch, name)
    }

    pub fn find_physical_switch(&self, name: &str) -> Option<RowUuid> {
        self.find_by_name(Table::PhysicalSwitch, name)
    }

    pub fn find_physical_port(&self, name: &str) -> Option<RowUuid> {
        self.find_by_name(Table::PhysicalPort, name)
    }

    pub fn find_physical_locator(&self, dst_ip: &str) -> Option<RowUuid> {
        self.cache()
            .all_rows(Table::PhysicalLocator)
            .into_iter()
            .find(|(_, row)| string_column(row, "dst_ip").as_deref() == Some(dst_ip))
            .map(|(uuid, _)| RowUuid::committed(uuid))
    }

    fn find_macs(&self, table: Table, logical_switch: &RowUuid, mac: &str) -> Vec<(String, Row)> {
        self.cache()
            .all_rows(table)
            .into_iter()
            .filter(|(_, row)| {
                mac_matches(row, mac) && references(row, "logical_switch", logical_switch)
            })
            .collect()
    }

    /// Remote unicast entries for `mac` on a logical switch carrying exactly
    /// `mac_ip` (no address when `None`), optionally narrowed by locator.
    /// MACs compare case-insensitively.
    pub fn find_ucast_macs_remote(
        &self,
        logical_switch: &RowUuid,
        mac: &str,
        mac_ip: Option<&str>,
        locator: Option<&RowUuid>,
    ) -> Vec<RowUuid> {
        self.find_macs(Table::UcastMacsRemote, logical_switch, mac)
            .into_iter()
            .filter(|(_, row)| {
                ipaddr_matches(row, mac_ip)
                    && locator.map_or(true, |pl| references(row, "locator", pl))
            })
            .map(|(uuid, _)| RowUuid::committed(uuid))
            .collect()
    }

    /// Remote unicast entries for `mac` on a logical switch, whatever their
    /// address
    pub fn find_all_ucast_macs_remote(&self, logical_switch: &RowUuid, mac: &str) -> Vec<RowUuid> {
        self.find_macs(Table::UcastMacsRemote, logical_switch, mac)
            .into_iter()
            .map(|(uuid, _)| RowUuid::committed(uuid))
            .collect()
    }

    pub fn find_mcast_macs_remote(&self, logical_switch: &RowUuid, mac: &str) -> Vec<RowUuid> {
        self.find_macs(Table::McastMacsRemote, logical_switch, mac)
            .into_iter()
            .map(|(uuid, _)| RowUuid::committed(uuid))
            .collect()
    }

    /// Every (port, vlan) pair bound to `logical_switch`
    pub fn port_vlan_bindings(&self, logical_switch: &RowUuid) -> Vec<VlanBinding> {
        let mut bindings = Vec::new();
        for (uuid, row) in self.cache().all_rows(Table::PhysicalPort) {
            let map = match row.get::<OvsMap<i64, RowUuid>>("vlan_bindings") {
                Ok(map) => map.unwrap_or_default(),
                Err(e) => {
                    warn!("Skipping Physical_Port {}: {}", uuid, e);
                    continue;
                }
            };
            for (vlan, ls) in &map {
                match u16::try_from(*vlan) {
                    Ok(vlan) if ls == logical_switch => bindings.push(VlanBinding {
                        port: RowUuid::committed(uuid.clone()),
                        vlan,
                    }),
                    Ok(_) => {}
                    Err(_) => warn!("Physical_Port {} has out of range vlan {}", uuid, vlan),
                }
            }
        }
        bindings
    }

    /// One mutate per port removing every vlan bound to `logical_switch`
    fn unbind_operations(&self, logical_switch: &RowUuid) -> Vec<Operation> {
        let mut by_port: BTreeMap<RowUuid, OvsSet<i64>> = BTreeMap::new();
        for binding in self.port_vlan_bindings(logical_switch) {
            debug!("Unbinding vlan {} from {}", binding.vlan, binding.port);
            by_port
                .entry(binding.port)
                .or_default()
                .insert(i64::from(binding.vlan));
        }
        by_port
            .into_iter()
            .map(|(port, vlans)| {
                Operation::mutate(
                    Table::PhysicalPort.name(),
                    vec![Condition::uuid_equals(&port)],
                    vec![Mutation::delete("vlan_bindings", &vlans)],
                )
            })
            .collect()
    }

    fn locator_for(&self, tx: &mut TransactBuilder, dst_ip: &str, uuid_name: &str) -> Locator {
        if let Some(uuid) = self.find_physical_locator(dst_ip) {
            return Locator::Existing(uuid);
        }
        tx.add_operation(Operation::insert_named(
            Table::PhysicalLocator.name(),
            uuid_name,
            Row::new()
                .with("dst_ip", &dst_ip.to_string())
                .with("encapsulation_type", &VXLAN_OVER_IPV4.to_string()),
        ));
        Locator::Created(RowUuid::named(uuid_name))
    }

    /// Flood unknown destinations on `logical_switch` to each of `flood_ips`
    /// through both remote MAC tables.
    fn push_flood_ips(
        &self,
        tx: &mut TransactBuilder,
        logical_switch: &RowUuid,
        flood_ips: &[&str],
    ) {
        for (i, ip) in flood_ips.iter().enumerate() {
            info!("Mapping {} to {} in mcast and ucast remote", UNKNOWN_DST, ip);
            let locator = self.locator_for(tx, ip, &format!("{}_{}", NEW_LOCATOR, i));
            push_mcast_remote(
                tx,
                logical_switch,
                UNKNOWN_DST,
                locator.uuid(),
                &format!("{}_{}", NEW_LOCATOR_SET, i),
                &format!("{}_{}", NEW_MCAST_MAC, i),
            );
            tx.add_operation(Operation::insert_named(
                Table::UcastMacsRemote.name(),
                format!("{}_{}", NEW_UCAST_MAC, i),
                Row::new()
                    .with("MAC", &UNKNOWN_DST.to_string())
                    .with("locator", &OvsSet::single(locator.uuid().clone()))
                    .with("ipaddr", &ip.to_string())
                    .with("logical_switch", &OvsSet::single(logical_switch.clone())),
            ));
        }
    }

    pub async fn vtep_add_logical_switch(&self, name: &str, vni: i64) -> Outcome {
        let row = Row::new()
            .with("name", &name.to_string())
            .with("tunnel_key", &OvsSet::single(vni));
        info!("Adding logical switch {} (vni {})", name, vni);
        self.insert_root(Table::LogicalSwitch, row).await
    }

    /// Delete a logical switch together with every MAC entry on it and every
    /// VLAN binding pointing at it.
    pub async fn vtep_delete_logical_switch(&self, name: &str) -> Outcome {
        let Some(ls) = self.find_logical_switch(name) else {
            return Outcome::not_found(format!("Logical_Switch {}", name));
        };

        let mut tx = TransactBuilder::new(Database::HardwareVtep.name());
        for table in MAC_TABLES {
            tx.add_operation(Operation::delete(
                table.name(),
                vec![Condition::equals("logical_switch", &ls)],
            ));
        }
        tx.add_operations(self.unbind_operations(&ls));
        tx.add_operation(Operation::delete(
            Table::LogicalSwitch.name(),
            vec![Condition::uuid_equals(&ls)],
        ));

        info!("Deleting logical switch {} ({})", name, ls);
        self.execute(&mut tx, None).await
    }

    /// Add a remote unicast MAC reachable through the VTEP at `vtep_ip`.
    /// An identical existing entry (same MAC, address and locator) is
    /// returned instead of duplicated.
    pub async fn vtep_add_ucast_mac_remote(
        &self,
        logical_switch: &str,
        mac: &str,
        vtep_ip: &str,
        mac_ip: Option<&str>,
    ) -> Outcome {
        let Some(ls) = self.find_logical_switch(logical_switch) else {
            return Outcome::not_found(format!("Logical_Switch {}", logical_switch));
        };

        let mut tx = TransactBuilder::new(Database::HardwareVtep.name());
        let locator = self.locator_for(&mut tx, vtep_ip, NEW_LOCATOR);
        if let Locator::Existing(pl) = &locator {
            if let Some(existing) = self
                .find_ucast_macs_remote(&ls, mac, mac_ip, Some(pl))
                .into_iter()
                .next()
            {
                debug!("Ucast_Macs_Remote {} on {} already present", mac, logical_switch);
                return Outcome::success_with_uuid(existing);
            }
        }

        let mut row = Row::new()
            .with("MAC", &mac.to_string())
            .with("locator", &OvsSet::single(locator.uuid().clone()))
            .with("logical_switch", &OvsSet::single(ls));
        if let Some(ip) = mac_ip {
            row.set("ipaddr", &ip.to_string());
        }
        let index = tx.add_operation(Operation::insert_named(
            Table::UcastMacsRemote.name(),
            NEW_UCAST_MAC,
            row,
        ));
        self.execute(&mut tx, Some(index)).await
    }

    /// Delete remote unicast entries for `mac`. With `mac_ip` only the
    /// entries carrying that address go; without it, all of them.
    pub async fn vtep_delete_ucast_mac_remote(
        &self,
        logical_switch: &str,
        mac: &str,
        mac_ip: Option<&str>,
    ) -> Outcome {
        let Some(ls) = self.find_logical_switch(logical_switch) else {
            return Outcome::not_found(format!("Logical_Switch {}", logical_switch));
        };
        let entries = match mac_ip {
            Some(ip) => self.find_ucast_macs_remote(&ls, mac, Some(ip), None),
            None => self.find_all_ucast_macs_remote(&ls, mac),
        };
        if entries.is_empty() {
            return Outcome::not_found(format!("Ucast_Macs_Remote {} on {}", mac, logical_switch));
        }
        self.delete_macs(Table::UcastMacsRemote, &entries).await
    }

    /// Add a remote multicast MAC (usually `unknown-dst`) flooded to the VTEP
    /// at `vtep_ip` through a one-locator set.
    pub async fn vtep_add_mcast_mac_remote(
        &self,
        logical_switch: &str,
        mac: &str,
        vtep_ip: &str,
    ) -> Outcome {
        let Some(ls) = self.find_logical_switch(logical_switch) else {
            return Outcome::not_found(format!("Logical_Switch {}", logical_switch));
        };

        let mut tx = TransactBuilder::new(Database::HardwareVtep.name());
        let locator = self.locator_for(&mut tx, vtep_ip, NEW_LOCATOR);
        let index = push_mcast_remote(
            &mut tx,
            &ls,
            mac,
            locator.uuid(),
            NEW_LOCATOR_SET,
            NEW_MCAST_MAC,
        );
        self.execute(&mut tx, Some(index)).await
    }

    pub async fn vtep_delete_mcast_mac_remote(&self, logical_switch: &str, mac: &str) -> Outcome {
        let Some(ls) = self.find_logical_switch(logical_switch) else {
            return Outcome::not_found(format!("Logical_Switch {}", logical_switch));
        };
        let entries = self.find_mcast_macs_remote(&ls, mac);
        if entries.is_empty() {
            return Outcome::not_found(format!("Mcast_Macs_Remote {} on {}", mac, logical_switch));
        }
        self.delete_macs(Table::McastMacsRemote, &entries).await
    }

    async fn delete_macs(&self, table: Table, entries: &[RowUuid]) -> Outcome {
        let mut tx = TransactBuilder::new(Database::HardwareVtep.name());
        for uuid in entries {
            tx.add_operation(Operation::delete(
                table.name(),
                vec![Condition::uuid_equals(uuid)],
            ));
        }
        info!("Deleting {} {} rows", entries.len(), table);
        self.execute(&mut tx, None).await
    }

    /// Create a port under the named physical switch
    pub async fn vtep_add_physical_switch_port(&self, switch: &str, port: &str) -> Outcome {
        let Some(ps) = self.find_physical_switch(switch) else {
            return Outcome::not_found(format!("Physical_Switch {}", switch));
        };
        let Some(link) = Table::PhysicalPort.descriptor().parent else {
            return Outcome::not_implemented("Physical_Port has no parent");
        };
        let row = Row::new()
            .with("name", &port.to_string())
            .with("vlan_bindings", &OvsMap::<i64, RowUuid>::new());
        let (mut tx, index) =
            build_insert_and_link(Database::HardwareVtep, link, &ps, Table::PhysicalPort, row);
        self.execute(&mut tx, Some(index)).await
    }

    /// Bind `vlan` on a physical port to a logical switch. When the switch
    /// does not exist and `vni` is given, it is created in the same
    /// transaction and its uuid returned. Each of `flood_ips` gets the
    /// switch's unknown-destination traffic.
    pub async fn vtep_bind_vlan(
        &self,
        logical_switch: &str,
        port: &str,
        vlan: u16,
        vni: Option<i64>,
        flood_ips: &[&str],
    ) -> Outcome {
        let Some(port_uuid) = self.find_physical_port(port) else {
            return Outcome::not_found(format!("Physical_Port {}", port));
        };

        let mut tx = TransactBuilder::new(Database::HardwareVtep.name());
        let mut insert_index = None;
        let ls = match (self.find_logical_switch(logical_switch), vni) {
            (Some(ls), _) => ls,
            (None, Some(vni)) => {
                let descriptor = Table::LogicalSwitch.descriptor();
                insert_index = Some(tx.add_operation(Operation::insert_named(
                    descriptor.name,
                    descriptor.uuid_name,
                    Row::new()
                        .with("name", &logical_switch.to_string())
                        .with("tunnel_key", &OvsSet::single(vni)),
                )));
                RowUuid::named(descriptor.uuid_name)
            }
            (None, None) => {
                return Outcome::not_found(format!("Logical_Switch {}", logical_switch))
            }
        };

        tx.add_operation(binding_operation(&port_uuid, vlan, ls.clone()));
        self.push_flood_ips(&mut tx, &ls, flood_ips);
        info!("Binding vlan {} on {} to {}", vlan, port, logical_switch);
        self.execute(&mut tx, insert_index).await
    }

    /// Bind several (port, vlan) pairs to an existing logical switch in one
    /// transaction. Every port must exist.
    pub async fn vtep_add_bindings(
        &self,
        logical_switch: &str,
        bindings: &[(&str, u16)],
    ) -> Outcome {
        let Some(ls) = self.find_logical_switch(logical_switch) else {
            return Outcome::not_found(format!("Logical_Switch {}", logical_switch));
        };

        let mut tx = TransactBuilder::new(Database::HardwareVtep.name());
        for &(port, vlan) in bindings {
            let Some(port_uuid) = self.find_physical_port(port) else {
                return Outcome::not_found(format!("Physical_Port {}", port));
            };
            tx.add_operation(binding_operation(&port_uuid, vlan, ls.clone()));
        }
        if tx.is_empty() {
            return Outcome::success();
        }
        info!("Adding {} bindings to {}", tx.len(), logical_switch);
        self.execute(&mut tx, None).await
    }

    /// Remove the binding of `vlan` on a physical port, whatever switch it
    /// points at
    pub async fn vtep_delete_binding(&self, port: &str, vlan: u16) -> Outcome {
        let Some(port_uuid) = self.find_physical_port(port) else {
            return Outcome::not_found(format!("Physical_Port {}", port));
        };
        let mut tx = TransactBuilder::new(Database::HardwareVtep.name());
        tx.add_operation(Operation::mutate(
            Table::PhysicalPort.name(),
            vec![Condition::uuid_equals(&port_uuid)],
            vec![Mutation::delete("vlan_bindings", &OvsSet::single(i64::from(vlan)))],
        ));
        info!("Deleting binding of vlan {} on {}", vlan, port);
        self.execute(&mut tx, None).await
    }

    /// Remove every (port, vlan) binding pointing at a logical switch
    pub async fn vtep_clear_bindings(&self, logical_switch: &str) -> Outcome {
        let Some(ls) = self.find_logical_switch(logical_switch) else {
            return Outcome::not_found(format!("Logical_Switch {}", logical_switch));
        };
        let mut tx = TransactBuilder::new(Database::HardwareVtep.name());
        tx.add_operations(self.unbind_operations(&ls));
        if tx.is_empty() {
            debug!("No bindings to clear on {}", logical_switch);
            return Outcome::success();
        }
        info!("Clearing bindings of {}", logical_switch);
        self.execute(&mut tx, None).await
    }
}
