use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Warehouse process type a workflow instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    OrderFulfillment,
    Picking,
    Packing,
    Returns,
    CrossDock,
    Replenishment,
    CycleCount,
    Receiving,
    Putaway,
    ValueAddedService,
    Wave,
    Waveless,
    QualityCheck,
    InventoryTransfer,
    Shipping,
}

impl WorkflowKind {
    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderFulfillment => "order_fulfillment",
            Self::Picking => "picking",
            Self::Packing => "packing",
            Self::Returns => "returns",
            Self::CrossDock => "cross_dock",
            Self::Replenishment => "replenishment",
            Self::CycleCount => "cycle_count",
            Self::Receiving => "receiving",
            Self::Putaway => "putaway",
            Self::ValueAddedService => "value_added_service",
            Self::Wave => "wave",
            Self::Waveless => "waveless",
            Self::QualityCheck => "quality_check",
            Self::InventoryTransfer => "inventory_transfer",
            Self::Shipping => "shipping",
        }
    }

    /// Check if this process type may run under waveless admission.
    pub fn supports_waveless(&self) -> bool {
        matches!(
            self,
            Self::OrderFulfillment
                | Self::Picking
                | Self::Packing
                | Self::Replenishment
                | Self::Shipping
                | Self::Waveless
        )
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "order_fulfillment" => Ok(Self::OrderFulfillment),
            "picking" => Ok(Self::Picking),
            "packing" => Ok(Self::Packing),
            "returns" => Ok(Self::Returns),
            "cross_dock" => Ok(Self::CrossDock),
            "replenishment" => Ok(Self::Replenishment),
            "cycle_count" => Ok(Self::CycleCount),
            "receiving" => Ok(Self::Receiving),
            "putaway" => Ok(Self::Putaway),
            "value_added_service" => Ok(Self::ValueAddedService),
            "wave" => Ok(Self::Wave),
            "waveless" => Ok(Self::Waveless),
            "quality_check" => Ok(Self::QualityCheck),
            "inventory_transfer" => Ok(Self::InventoryTransfer),
            "shipping" => Ok(Self::Shipping),
            other => Err(format!("unknown workflow kind '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_conversion() {
        assert_eq!(WorkflowKind::OrderFulfillment.as_str(), "order_fulfillment");
        assert_eq!(
            "order_fulfillment".parse::<WorkflowKind>().unwrap(),
            WorkflowKind::OrderFulfillment
        );
        assert_eq!(
            "cross_dock".parse::<WorkflowKind>().unwrap(),
            WorkflowKind::CrossDock
        );
        assert!("bogus".parse::<WorkflowKind>().is_err());
    }

    #[test]
    fn test_waveless_support() {
        assert!(WorkflowKind::OrderFulfillment.supports_waveless());
        assert!(WorkflowKind::Picking.supports_waveless());
        assert!(WorkflowKind::Waveless.supports_waveless());
        assert!(!WorkflowKind::Wave.supports_waveless());
        assert!(!WorkflowKind::CycleCount.supports_waveless());
        assert!(!WorkflowKind::Returns.supports_waveless());
    }
}
