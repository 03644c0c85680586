use std::collections::BTreeMap;

use crate::message::{CellVoltagesMessage, GenericInfoMessage};

/// The merged result of one generic-info cycle plus one cell-voltages cycle.
///
/// Built fresh per query pair and discarded once reported.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Pack current in A. Negative while discharging.
    pub current_a: f64,
    /// Nominal (full) capacity in Ah.
    pub capacity_ah: f64,
    /// Remaining capacity in Ah.
    pub capacity_remaining_ah: f64,
    /// Cell-balance bitmask.
    pub balance: u16,
    /// One reading per temperature sensor, °C.
    pub temperatures_c: Vec<f64>,
    /// Per-cell voltages in V, in wire order.
    pub cell_voltages_v: Vec<f64>,
    /// Total pack voltage in V.
    pub pack_voltage_v: f64,
}

impl TelemetryRecord {
    pub fn from_messages(info: &GenericInfoMessage, voltages: &CellVoltagesMessage) -> Self {
        Self {
            current_a: info.current_a(),
            capacity_ah: info.capacity_ah(),
            capacity_remaining_ah: info.capacity_remaining_ah(),
            balance: info.balance(),
            temperatures_c: info.temperatures_c(),
            cell_voltages_v: voltages.cell_voltages_v().to_vec(),
            pack_voltage_v: voltages.pack_voltage_v(),
        }
    }

    /// The record as a sorted name → value mapping, using the field names the
    /// reporting output has always used: `Ibat`, `Cap`, `CapRem`, `Bal`,
    /// `T1..Tn`, `V01..Vnn`, `Vbat`.
    pub fn fields(&self) -> BTreeMap<String, f64> {
        let mut fields = BTreeMap::new();
        fields.insert("Ibat".into(), self.current_a);
        fields.insert("Cap".into(), self.capacity_ah);
        fields.insert("CapRem".into(), self.capacity_remaining_ah);
        fields.insert("Bal".into(), self.balance as f64);
        for (i, t) in self.temperatures_c.iter().enumerate() {
            fields.insert(format!("T{}", i + 1), *t);
        }
        for (i, v) in self.cell_voltages_v.iter().enumerate() {
            fields.insert(format!("V{:02}", i + 1), *v);
        }
        fields.insert("Vbat".into(), self.pack_voltage_v);
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_use_the_reporting_names() {
        let record = TelemetryRecord {
            current_a: -1.5,
            capacity_ah: 20.0,
            capacity_remaining_ah: 4.0,
            balance: 5,
            temperatures_c: vec![25.0, 26.1],
            cell_voltages_v: vec![3.3, 3.301, 3.299, 3.3],
            pack_voltage_v: 13.2,
        };
        let fields = record.fields();
        assert_eq!(fields["Ibat"], -1.5);
        assert_eq!(fields["Cap"], 20.0);
        assert_eq!(fields["CapRem"], 4.0);
        assert_eq!(fields["Bal"], 5.0);
        assert_eq!(fields["T2"], 26.1);
        assert_eq!(fields["V01"], 3.3);
        assert_eq!(fields["V04"], 3.3);
        assert_eq!(fields["Vbat"], 13.2);
        // two-digit cell keys sort in cell order
        let cells: Vec<&str> = fields
            .keys()
            .filter(|k| k.starts_with('V'))
            .map(|k| k.as_str())
            .collect();
        assert_eq!(cells, ["V01", "V02", "V03", "V04", "Vbat"]);
    }
}
