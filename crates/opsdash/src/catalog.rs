//! Static license SKU reference data.
//!
//! Maps a Microsoft licensing SKU part number to a human-friendly product
//! name and an estimated monthly per-seat price in USD. Prices drive the
//! waste estimates in [`crate::scoring::licensing`]; a SKU missing from the
//! table resolves to a price of zero so unpriced add-ons never inflate the
//! waste report.

struct SkuEntry {
    part_number: &'static str,
    friendly_name: &'static str,
    monthly_per_seat: f64,
}

const CATALOG: &[SkuEntry] = &[
    SkuEntry {
        part_number: "ENTERPRISEPACK",
        friendly_name: "Office 365 E3",
        monthly_per_seat: 36.00,
    },
    SkuEntry {
        part_number: "ENTERPRISEPREMIUM",
        friendly_name: "Office 365 E5",
        monthly_per_seat: 57.00,
    },
    SkuEntry {
        part_number: "SPE_E3",
        friendly_name: "Microsoft 365 E3",
        monthly_per_seat: 40.50,
    },
    SkuEntry {
        part_number: "SPE_E5",
        friendly_name: "Microsoft 365 E5",
        monthly_per_seat: 64.80,
    },
    SkuEntry {
        part_number: "SPB",
        friendly_name: "Microsoft 365 Business Premium",
        monthly_per_seat: 22.00,
    },
    SkuEntry {
        part_number: "O365_BUSINESS_PREMIUM",
        friendly_name: "Microsoft 365 Business Standard",
        monthly_per_seat: 12.50,
    },
    SkuEntry {
        part_number: "O365_BUSINESS_ESSENTIALS",
        friendly_name: "Microsoft 365 Business Basic",
        monthly_per_seat: 6.00,
    },
    SkuEntry {
        part_number: "DESKLESSPACK",
        friendly_name: "Office 365 F3",
        monthly_per_seat: 8.00,
    },
    SkuEntry {
        part_number: "SPE_F1",
        friendly_name: "Microsoft 365 F3",
        monthly_per_seat: 8.00,
    },
    SkuEntry {
        part_number: "EXCHANGESTANDARD",
        friendly_name: "Exchange Online (Plan 1)",
        monthly_per_seat: 4.00,
    },
    SkuEntry {
        part_number: "EXCHANGEENTERPRISE",
        friendly_name: "Exchange Online (Plan 2)",
        monthly_per_seat: 8.00,
    },
    SkuEntry {
        part_number: "EMS",
        friendly_name: "Enterprise Mobility + Security E3",
        monthly_per_seat: 10.60,
    },
    SkuEntry {
        part_number: "EMSPREMIUM",
        friendly_name: "Enterprise Mobility + Security E5",
        monthly_per_seat: 16.40,
    },
    SkuEntry {
        part_number: "AAD_PREMIUM",
        friendly_name: "Microsoft Entra ID P1",
        monthly_per_seat: 6.00,
    },
    SkuEntry {
        part_number: "AAD_PREMIUM_P2",
        friendly_name: "Microsoft Entra ID P2",
        monthly_per_seat: 9.00,
    },
    SkuEntry {
        part_number: "INTUNE_A",
        friendly_name: "Microsoft Intune Plan 1",
        monthly_per_seat: 8.00,
    },
    SkuEntry {
        part_number: "ATP_ENTERPRISE",
        friendly_name: "Microsoft Defender for Office 365 (Plan 1)",
        monthly_per_seat: 2.00,
    },
    SkuEntry {
        part_number: "POWER_BI_PRO",
        friendly_name: "Power BI Pro",
        monthly_per_seat: 10.00,
    },
    SkuEntry {
        part_number: "PROJECTPROFESSIONAL",
        friendly_name: "Project Plan 3",
        monthly_per_seat: 30.00,
    },
    SkuEntry {
        part_number: "VISIOCLIENT",
        friendly_name: "Visio Plan 2",
        monthly_per_seat: 15.00,
    },
    SkuEntry {
        part_number: "POWER_BI_STANDARD",
        friendly_name: "Power BI (free)",
        monthly_per_seat: 0.00,
    },
    SkuEntry {
        part_number: "FLOW_FREE",
        friendly_name: "Power Automate Free",
        monthly_per_seat: 0.00,
    },
    SkuEntry {
        part_number: "TEAMS_EXPLORATORY",
        friendly_name: "Microsoft Teams Exploratory",
        monthly_per_seat: 0.00,
    },
];

fn lookup(part_number: &str) -> Option<&'static SkuEntry> {
    CATALOG
        .iter()
        .find(|entry| entry.part_number.eq_ignore_ascii_case(part_number))
}

/// Friendly display name for a SKU; falls back to the raw part number.
pub fn friendly_name(part_number: &str) -> String {
    lookup(part_number)
        .map(|entry| entry.friendly_name.to_string())
        .unwrap_or_else(|| part_number.to_string())
}

/// Estimated monthly per-seat price in USD. Unknown SKUs price at zero.
pub fn monthly_price(part_number: &str) -> f64 {
    lookup(part_number)
        .map(|entry| entry.monthly_per_seat)
        .unwrap_or(0.0)
}
