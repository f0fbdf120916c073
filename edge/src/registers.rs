//! Sungrow SH4.0RS Modbus TCP register map.
//!
//! Defines all register addresses, data types, scaling factors, units, and
//! valid value ranges for the Sungrow SH4.0RS hybrid inverter accessed via
//! the WiNet-S Modbus TCP dongle (port 502, slave ID 1, function code 0x04
//! input registers).
//!
//! Registers are organised into contiguous groups so the poller can issue
//! one `read_input_registers` call per group. Every group's descriptors
//! tile its address interval exactly; the contract is enforced by the tests
//! at the bottom of this module.
//!
//! References:
//!     - Sungrow Hybrid Inverter Communication Protocol
//!     - https://github.com/mkaiser/Sungrow-SHx-Inverter-Modbus-Home-Assistant
//!     - https://github.com/bohdan-s/SunGather

/// Register data type: word width plus signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegKind {
    U16,
    S16,
    U32,
    S32,
}

impl RegKind {
    /// Number of 16-bit Modbus words the register occupies.
    pub const fn word_count(self) -> u16 {
        match self {
            RegKind::U16 | RegKind::S16 => 1,
            RegKind::U32 | RegKind::S32 => 2,
        }
    }

    pub const fn signed(self) -> bool {
        matches!(self, RegKind::S16 | RegKind::S32)
    }
}

/// Definition of a single Modbus input register.
#[derive(Debug, Clone, Copy)]
pub struct RegisterDef {
    /// Modbus input register start address
    pub address: u16,
    /// Unique identifier used as the raw-map key
    pub name: &'static str,
    pub kind: RegKind,
    /// Engineering unit of the scaled value
    pub unit: &'static str,
    /// Multiplicative factor from raw integer to engineering value
    pub scale: f64,
    /// Inclusive `(min, max)` bounds for the *scaled* value
    pub valid_range: (f64, f64),
}

/// A contiguous range of registers read in a single Modbus request.
#[derive(Debug, Clone, Copy)]
pub struct RegisterGroup {
    pub name: &'static str,
    pub start_address: u16,
    /// Total number of 16-bit words to read
    pub count: u16,
    pub registers: &'static [RegisterDef],
}

/// Name of the group that some inverters do not expose; a Modbus error
/// reading it is tolerated and the cycle continues without it.
pub const OPTIONAL_GROUP: &str = "export";

pub const DEVICE_GROUP: RegisterGroup = RegisterGroup {
    name: "device",
    start_address: 5000,
    count: 1,
    registers: &[RegisterDef {
        address: 5000,
        name: "device_type_code",
        kind: RegKind::U16,
        unit: "",
        scale: 1.0,
        valid_range: (0.0, 65535.0),
    }],
};

pub const PV_POWER_GROUP: RegisterGroup = RegisterGroup {
    name: "pv_power",
    start_address: 5004,
    count: 2,
    registers: &[RegisterDef {
        address: 5004,
        name: "total_dc_power",
        kind: RegKind::U32,
        unit: "W",
        scale: 1.0,
        valid_range: (0.0, 20000.0),
    }],
};

pub const PV_DAILY_GROUP: RegisterGroup = RegisterGroup {
    name: "pv_daily",
    start_address: 5011,
    count: 1,
    registers: &[RegisterDef {
        address: 5011,
        name: "daily_pv_generation",
        kind: RegKind::U16,
        unit: "kWh",
        scale: 0.1,
        valid_range: (0.0, 100.0),
    }],
};

pub const MPPT_GROUP: RegisterGroup = RegisterGroup {
    name: "mppt",
    start_address: 5012,
    count: 4,
    registers: &[
        RegisterDef {
            address: 5012,
            name: "mppt1_voltage",
            kind: RegKind::U16,
            unit: "V",
            scale: 0.1,
            valid_range: (0.0, 600.0),
        },
        RegisterDef {
            address: 5013,
            name: "mppt1_current",
            kind: RegKind::U16,
            unit: "A",
            scale: 0.1,
            valid_range: (0.0, 20.0),
        },
        RegisterDef {
            address: 5014,
            name: "mppt2_voltage",
            kind: RegKind::U16,
            unit: "V",
            scale: 0.1,
            valid_range: (0.0, 600.0),
        },
        RegisterDef {
            address: 5015,
            name: "mppt2_current",
            kind: RegKind::U16,
            unit: "A",
            scale: 0.1,
            valid_range: (0.0, 20.0),
        },
    ],
};

pub const PV_TOTAL_GROUP: RegisterGroup = RegisterGroup {
    name: "pv_total",
    start_address: 5017,
    count: 2,
    registers: &[RegisterDef {
        address: 5017,
        name: "total_pv_generation",
        kind: RegKind::U32,
        unit: "kWh",
        scale: 0.1,
        valid_range: (0.0, 1_000_000.0),
    }],
};

/// Inverter-estimated export power. Positive = exporting to grid,
/// negative = importing. Not exposed by every firmware (see
/// [`OPTIONAL_GROUP`]).
pub const EXPORT_GROUP: RegisterGroup = RegisterGroup {
    name: "export",
    start_address: 5083,
    count: 2,
    registers: &[RegisterDef {
        address: 5083,
        name: "export_power",
        kind: RegKind::S32,
        unit: "W",
        scale: 1.0,
        valid_range: (-20000.0, 20000.0),
    }],
};

pub const LOAD_GROUP: RegisterGroup = RegisterGroup {
    name: "load",
    start_address: 13008,
    count: 3,
    registers: &[
        RegisterDef {
            address: 13008,
            name: "load_power",
            kind: RegKind::S32,
            unit: "W",
            scale: 1.0,
            valid_range: (-20000.0, 50000.0),
        },
        // Positive = importing, negative = exporting.
        RegisterDef {
            address: 13010,
            name: "grid_power",
            kind: RegKind::S16,
            unit: "W",
            scale: 1.0,
            valid_range: (-20000.0, 20000.0),
        },
    ],
};

pub const CONSUMPTION_GROUP: RegisterGroup = RegisterGroup {
    name: "consumption",
    start_address: 13017,
    count: 1,
    registers: &[RegisterDef {
        address: 13017,
        name: "daily_direct_consumption",
        kind: RegKind::U16,
        unit: "kWh",
        scale: 0.1,
        valid_range: (0.0, 200.0),
    }],
};

pub const BATTERY_GROUP: RegisterGroup = RegisterGroup {
    name: "battery",
    start_address: 13022,
    count: 3,
    registers: &[
        // Positive = charging, negative = discharging.
        RegisterDef {
            address: 13022,
            name: "battery_power",
            kind: RegKind::S16,
            unit: "W",
            scale: 1.0,
            valid_range: (-10000.0, 10000.0),
        },
        RegisterDef {
            address: 13023,
            name: "battery_soc",
            kind: RegKind::U16,
            unit: "%",
            scale: 0.1,
            valid_range: (0.0, 100.0),
        },
        RegisterDef {
            address: 13024,
            name: "battery_temperature",
            kind: RegKind::U16,
            unit: "C",
            scale: 0.1,
            valid_range: (-20.0, 60.0),
        },
    ],
};

pub const BATTERY_DAILY_GROUP: RegisterGroup = RegisterGroup {
    name: "battery_daily",
    start_address: 13026,
    count: 2,
    registers: &[
        RegisterDef {
            address: 13026,
            name: "daily_battery_discharge",
            kind: RegKind::U16,
            unit: "kWh",
            scale: 0.1,
            valid_range: (0.0, 100.0),
        },
        RegisterDef {
            address: 13027,
            name: "daily_battery_charge",
            kind: RegKind::U16,
            unit: "kWh",
            scale: 0.1,
            valid_range: (0.0, 100.0),
        },
    ],
};

/// All register groups in recommended read order.
pub const ALL_GROUPS: &[RegisterGroup] = &[
    DEVICE_GROUP,
    PV_POWER_GROUP,
    PV_DAILY_GROUP,
    MPPT_GROUP,
    PV_TOTAL_GROUP,
    EXPORT_GROUP,
    LOAD_GROUP,
    CONSUMPTION_GROUP,
    BATTERY_GROUP,
    BATTERY_DAILY_GROUP,
];

/// Looks up a register definition by name across all groups.
pub fn register_by_name(name: &str) -> Option<&'static RegisterDef> {
    ALL_GROUPS
        .iter()
        .flat_map(|group| group.registers.iter())
        .find(|reg| reg.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn groups_tile_their_intervals_without_gaps() {
        for group in ALL_GROUPS {
            let mut next = group.start_address;
            for reg in group.registers {
                assert_eq!(
                    reg.address, next,
                    "group '{}': register '{}' leaves a gap or overlap",
                    group.name, reg.name
                );
                next += reg.kind.word_count();
            }
            assert_eq!(
                next,
                group.start_address + group.count,
                "group '{}': count does not match register widths",
                group.name
            );
        }
    }

    #[test]
    fn no_address_appears_twice() {
        let mut seen = HashSet::new();
        for group in ALL_GROUPS {
            for reg in group.registers {
                for offset in 0..reg.kind.word_count() {
                    assert!(
                        seen.insert(reg.address + offset),
                        "address {} claimed twice (register '{}')",
                        reg.address + offset,
                        reg.name
                    );
                }
            }
        }
    }

    #[test]
    fn no_name_appears_twice() {
        let mut seen = HashSet::new();
        for group in ALL_GROUPS {
            for reg in group.registers {
                assert!(seen.insert(reg.name), "duplicate register name '{}'", reg.name);
            }
        }
    }

    #[test]
    fn scales_are_positive_and_ranges_ordered() {
        for group in ALL_GROUPS {
            for reg in group.registers {
                assert!(reg.scale > 0.0, "register '{}' has scale <= 0", reg.name);
                let (min, max) = reg.valid_range;
                assert!(min <= max, "register '{}' has min > max", reg.name);
            }
        }
    }

    #[test]
    fn lookup_by_name() {
        let reg = register_by_name("total_dc_power").unwrap();
        assert_eq!(reg.address, 5004);
        assert_eq!(reg.kind, RegKind::U32);
        assert!(register_by_name("no_such_register").is_none());
    }

    #[test]
    fn word_counts_match_kinds() {
        assert_eq!(RegKind::U16.word_count(), 1);
        assert_eq!(RegKind::S16.word_count(), 1);
        assert_eq!(RegKind::U32.word_count(), 2);
        assert_eq!(RegKind::S32.word_count(), 2);
        assert!(RegKind::S16.signed());
        assert!(!RegKind::U32.signed());
    }
}
