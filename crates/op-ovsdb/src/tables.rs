//! Table registry for the `Open_vSwitch` and `hardware_vtep` databases
//!
//! Each table is resolved once from its wire name into a [`Table`], whose
//! [`TableDescriptor`] says where its rows hang (parent table and column),
//! how a delete must be issued, and which `uuid-name` new rows get.

use std::fmt;
use std::str::FromStr;

use crate::error::OvsdbError;

/// Databases this engine knows how to configure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Database {
    OpenVSwitch,
    HardwareVtep,
}

impl Database {
    pub fn name(&self) -> &'static str {
        match self {
            Database::OpenVSwitch => "Open_vSwitch",
            Database::HardwareVtep => "hardware_vtep",
        }
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Database {
    type Err = OvsdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open_vSwitch" => Ok(Database::OpenVSwitch),
            "hardware_vtep" => Ok(Database::HardwareVtep),
            other => Err(OvsdbError::not_found(format!("database {}", other))),
        }
    }
}

/// How a row is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Unlink from the parent column, then delete the row
    Owned,
    /// Unlink only; the server garbage-collects the unreferenced row
    Referenced,
    /// May exist unreferenced; delete the row, never touch a parent
    Root,
}

/// Where rows of a table are referenced from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    pub table: Table,
    pub column: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    pub table: Table,
    pub name: &'static str,
    pub database: Database,
    pub parent: Option<ParentLink>,
    pub ownership: Ownership,
    /// `uuid-name` given to a freshly inserted row
    pub uuid_name: &'static str,
    pub insertable: bool,
    pub deletable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    // Open_vSwitch
    OpenVSwitch,
    Bridge,
    Port,
    Interface,
    Controller,
    Manager,
    Mirror,
    NetFlow,
    Qos,
    Queue,
    SFlow,
    Ssl,
    Ipfix,
    FlowTable,
    FlowSampleCollectorSet,
    // hardware_vtep
    Global,
    VtepManager,
    PhysicalSwitch,
    PhysicalPort,
    PhysicalLocator,
    PhysicalLocatorSet,
    LogicalSwitch,
    UcastMacsLocal,
    UcastMacsRemote,
    McastMacsLocal,
    McastMacsRemote,
}

const fn link(table: Table, column: &'static str) -> Option<ParentLink> {
    Some(ParentLink { table, column })
}

impl Table {
    pub const ALL: &'static [Table] = &[
        Table::OpenVSwitch,
        Table::Bridge,
        Table::Port,
        Table::Interface,
        Table::Controller,
        Table::Manager,
        Table::Mirror,
        Table::NetFlow,
        Table::Qos,
        Table::Queue,
        Table::SFlow,
        Table::Ssl,
        Table::Ipfix,
        Table::FlowTable,
        Table::FlowSampleCollectorSet,
        Table::Global,
        Table::VtepManager,
        Table::PhysicalSwitch,
        Table::PhysicalPort,
        Table::PhysicalLocator,
        Table::PhysicalLocatorSet,
        Table::LogicalSwitch,
        Table::UcastMacsLocal,
        Table::UcastMacsRemote,
        Table::McastMacsLocal,
        Table::McastMacsRemote,
    ];

    pub fn descriptor(self) -> TableDescriptor {
        use Database::{HardwareVtep as Vtep, OpenVSwitch as Ovs};
        use Ownership::{Owned, Referenced, Root};

        let (name, database) = match self {
            Table::OpenVSwitch => ("Open_vSwitch", Ovs),
            Table::Bridge => ("Bridge", Ovs),
            Table::Port => ("Port", Ovs),
            Table::Interface => ("Interface", Ovs),
            Table::Controller => ("Controller", Ovs),
            Table::Manager => ("Manager", Ovs),
            Table::Mirror => ("Mirror", Ovs),
            Table::NetFlow => ("NetFlow", Ovs),
            Table::Qos => ("QoS", Ovs),
            Table::Queue => ("Queue", Ovs),
            Table::SFlow => ("sFlow", Ovs),
            Table::Ssl => ("SSL", Ovs),
            Table::Ipfix => ("IPFIX", Ovs),
            Table::FlowTable => ("Flow_Table", Ovs),
            Table::FlowSampleCollectorSet => ("Flow_Sample_Collector_Set", Ovs),
            Table::Global => ("Global", Vtep),
            Table::VtepManager => ("Manager", Vtep),
            Table::PhysicalSwitch => ("Physical_Switch", Vtep),
            Table::PhysicalPort => ("Physical_Port", Vtep),
            Table::PhysicalLocator => ("Physical_Locator", Vtep),
            Table::PhysicalLocatorSet => ("Physical_Locator_Set", Vtep),
            Table::LogicalSwitch => ("Logical_Switch", Vtep),
            Table::UcastMacsLocal => ("Ucast_Macs_Local", Vtep),
            Table::UcastMacsRemote => ("Ucast_Macs_Remote", Vtep),
            Table::McastMacsLocal => ("Mcast_Macs_Local", Vtep),
            Table::McastMacsRemote => ("Mcast_Macs_Remote", Vtep),
        };

        let (parent, ownership) = match self {
            Table::Bridge => (link(Table::OpenVSwitch, "bridges"), Owned),
            Table::Port => (link(Table::Bridge, "ports"), Owned),
            Table::Interface => (link(Table::Port, "interfaces"), Owned),
            Table::Mirror => (link(Table::Bridge, "mirrors"), Owned),
            Table::Controller => (link(Table::Bridge, "controller"), Referenced),
            Table::Manager => (link(Table::OpenVSwitch, "manager_options"), Referenced),
            Table::NetFlow => (link(Table::Bridge, "netflow"), Referenced),
            Table::SFlow => (link(Table::Bridge, "sflow"), Referenced),
            Table::Ssl => (link(Table::OpenVSwitch, "ssl"), Referenced),
            Table::Ipfix => (link(Table::Bridge, "ipfix"), Referenced),
            Table::Qos => (link(Table::Port, "qos"), Root),
            Table::VtepManager => (link(Table::Global, "managers"), Referenced),
            Table::PhysicalSwitch => (link(Table::Global, "switches"), Owned),
            Table::PhysicalPort => (link(Table::PhysicalSwitch, "ports"), Owned),
            _ => (None, Root),
        };

        let uuid_name = match self {
            Table::OpenVSwitch => "new_open_vswitch",
            Table::Bridge => "new_bridge",
            Table::Port => "new_port",
            Table::Interface => "new_interface",
            Table::Controller => "new_controller",
            Table::Manager | Table::VtepManager => "new_manager",
            Table::Mirror => "new_mirror",
            Table::NetFlow => "new_netflow",
            Table::Qos => "new_qos",
            Table::Queue => "new_queue",
            Table::SFlow => "new_sflow",
            Table::Ssl => "new_ssl",
            Table::Ipfix => "new_ipfix",
            Table::FlowTable => "new_flow_table",
            Table::FlowSampleCollectorSet => "new_fscs",
            Table::Global => "new_global",
            Table::PhysicalSwitch => "new_phys_switch",
            Table::PhysicalPort => "new_phys_port",
            Table::PhysicalLocator => "new_phys_locator",
            Table::PhysicalLocatorSet => "new_phys_locator_set",
            Table::LogicalSwitch => "new_logical_switch",
            Table::UcastMacsLocal => "new_ucast_macs_local",
            Table::UcastMacsRemote => "new_ucast_macs_remote",
            Table::McastMacsLocal => "new_mcast_macs_local",
            Table::McastMacsRemote => "new_mcast_macs_remote",
        };

        // The switch-wide singleton rows are managed by ovs-vsctl init / the
        // VTEP emulator, not by this client.
        let managed = !matches!(self, Table::OpenVSwitch);

        TableDescriptor {
            table: self,
            name,
            database,
            parent,
            ownership,
            uuid_name,
            insertable: managed,
            deletable: managed && self != Table::Global,
        }
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn database(self) -> Database {
        self.descriptor().database
    }

    /// Tables holding exactly one row, usable as an implicit parent
    pub fn is_singleton(self) -> bool {
        matches!(self, Table::OpenVSwitch | Table::Global)
    }

    pub fn tables_of(db: Database) -> impl Iterator<Item = Table> {
        Table::ALL.iter().copied().filter(move |t| t.database() == db)
    }

    /// Resolve a wire table name within `db`. Exact names win; a
    /// case-insensitive match is accepted for hand-typed names.
    pub fn from_name(db: Database, name: &str) -> Option<Table> {
        Table::tables_of(db)
            .find(|t| t.name() == name)
            .or_else(|| Table::tables_of(db).find(|t| t.name().eq_ignore_ascii_case(name)))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_resolves_by_name() {
        for &table in Table::ALL {
            assert_eq!(Table::from_name(table.database(), table.name()), Some(table));
        }
    }

    #[test]
    fn test_manager_is_per_database() {
        assert_eq!(
            Table::from_name(Database::OpenVSwitch, "Manager"),
            Some(Table::Manager)
        );
        assert_eq!(
            Table::from_name(Database::HardwareVtep, "Manager"),
            Some(Table::VtepManager)
        );
    }

    #[test]
    fn test_case_insensitive_fallback() {
        assert_eq!(Table::from_name(Database::OpenVSwitch, "sflow"), Some(Table::SFlow));
        assert_eq!(Table::from_name(Database::OpenVSwitch, "qos"), Some(Table::Qos));
        assert_eq!(Table::from_name(Database::OpenVSwitch, "Logical_Switch"), None);
    }

    #[test]
    fn test_parents_share_database() {
        for &table in Table::ALL {
            if let Some(parent) = table.descriptor().parent {
                assert_eq!(parent.table.database(), table.database(), "{}", table);
            }
        }
    }

    #[test]
    fn test_uuid_names_are_valid_ids() {
        for &table in Table::ALL {
            let name = table.descriptor().uuid_name;
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
            assert!(!name.starts_with(|c: char| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_database_names() {
        assert_eq!("hardware_vtep".parse::<Database>().unwrap(), Database::HardwareVtep);
        assert!("nope".parse::<Database>().is_err());
        assert!(!Table::OpenVSwitch.descriptor().insertable);
        assert!(!Table::Global.descriptor().deletable);
    }
}
