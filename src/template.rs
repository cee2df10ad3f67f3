//! Field templates: one generic structured-metrics document, shaped by a
//! category-specific field list.
//!
//! A [`Template`] describes which fields an analysis document carries and what
//! kind of value each one holds. It builds the all-null skeleton that analyzers
//! fill in, and it conforms foreign documents (completer replies) back to the
//! same shape.

use log::debug;

use crate::document::{Document, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Optional floating-point metric.
    Number,
    /// Optional whole-number metric.
    Count,
    Text,
    /// List of values, empty until filled.
    List,
    /// Open-ended map (column → value); any keys allowed.
    Map,
    Group(&'static [FieldSpec]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn number(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Number,
    }
}

const fn count(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Count,
    }
}

const fn text(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
    }
}

const fn list(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::List,
    }
}

const fn map(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Map,
    }
}

const fn group(name: &'static str, fields: &'static [FieldSpec]) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Group(fields),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Template {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl Template {
    pub fn skeleton(&self) -> Document {
        skeleton_of(self.fields)
    }

    /// Drops fields the template does not declare and replaces values whose
    /// kind does not fit the declaration with null. Map contents pass through.
    pub fn conform(&self, document: &Document) -> Document {
        conform_group(self.fields, document, self.name)
    }

    pub fn field(&self, path: &[&str]) -> Option<&'static FieldSpec> {
        let mut fields = self.fields;
        let mut found = None;
        for (depth, key) in path.iter().enumerate() {
            let spec = fields.iter().find(|spec| spec.name == *key)?;
            found = Some(spec);
            if depth + 1 < path.len() {
                match spec.kind {
                    FieldKind::Group(children) => fields = children,
                    _ => return None,
                }
            }
        }
        found
    }
}

fn skeleton_of(fields: &[FieldSpec]) -> Document {
    fields
        .iter()
        .map(|spec| {
            let value = match spec.kind {
                FieldKind::Number | FieldKind::Count | FieldKind::Text => Value::Null,
                FieldKind::List => Value::List(Vec::new()),
                FieldKind::Map => Value::Document(Document::new()),
                FieldKind::Group(children) => Value::Document(skeleton_of(children)),
            };
            (spec.name.to_string(), value)
        })
        .collect()
}

fn conform_group(fields: &[FieldSpec], document: &Document, path: &str) -> Document {
    for key in document.keys() {
        if !fields.iter().any(|spec| spec.name == key) {
            debug!("Dropping undeclared field '{path}.{key}'");
        }
    }
    fields
        .iter()
        .map(|spec| {
            let value = document.get(spec.name).cloned().unwrap_or(Value::Null);
            let conformed = match (spec.kind, value) {
                (_, Value::Null) => default_for(spec.kind),
                (FieldKind::Number, value @ (Value::Integer(_) | Value::Float(_))) => value,
                (FieldKind::Count, Value::Integer(i)) => Value::Integer(i),
                (FieldKind::Count, Value::Float(f)) if f.fract() == 0.0 => {
                    Value::Integer(f as i64)
                }
                (FieldKind::Text, value @ Value::Text(_)) => value,
                (FieldKind::List, value @ Value::List(_)) => value,
                (FieldKind::Map, value @ Value::Document(_)) => value,
                (FieldKind::Group(children), Value::Document(nested)) => Value::Document(
                    conform_group(children, &nested, &format!("{path}.{}", spec.name)),
                ),
                (kind, other) => {
                    debug!(
                        "Field '{path}.{}' expected {kind:?}, found {}; treating as null",
                        spec.name,
                        other.kind()
                    );
                    default_for(kind)
                }
            };
            (spec.name.to_string(), conformed)
        })
        .collect()
}

fn default_for(kind: FieldKind) -> Value {
    match kind {
        FieldKind::Group(children) => Value::Document(skeleton_of(children)),
        FieldKind::List => Value::List(Vec::new()),
        FieldKind::Map => Value::Document(Document::new()),
        FieldKind::Number | FieldKind::Count | FieldKind::Text => Value::Null,
    }
}

const ENERGY: &[FieldSpec] = &[
    list("matched_columns"),
    number("total_energy_kwh"),
    map("total"),
    map("average"),
];

const SCOPE: &[FieldSpec] = &[number("total_emissions_kg"), list("sources")];

const SCOPES: &[FieldSpec] = &[
    group("scope_1", SCOPE),
    group("scope_2", SCOPE),
    group("scope_3", SCOPE),
];

const EMISSIONS: &[FieldSpec] = &[
    list("matched_columns"),
    number("total_emissions_kg"),
    map("total"),
    map("average"),
    group("scopes", SCOPES),
];

const WATER_USAGE: &[FieldSpec] = &[
    list("matched_columns"),
    number("total_liters"),
    number("average_per_month"),
];

const WASTE: &[FieldSpec] = &[
    list("matched_columns"),
    number("total_waste_kg"),
    number("hazardous_waste_kg"),
    number("recycled_waste_kg"),
];

const DERIVED_METRICS: &[FieldSpec] = &[
    number("emissions_per_kwh"),
    number("emissions_per_employee"),
    number("energy_intensity"),
    number("waste_per_unit_production"),
];

const AI_ANALYSIS: &[FieldSpec] = &[
    list("missing_data_fields"),
    list("anomalies"),
    list("inferred_scopes"),
    list("ai_comments"),
];

const NUMERIC_SUMMARY: &[FieldSpec] = &[map("year"), map("month")];

const PARTIAL_ANALYSIS: &[FieldSpec] = &[
    group("numeric_summary", NUMERIC_SUMMARY),
    group("energy", ENERGY),
    group("emissions", EMISSIONS),
    group("water_usage", WATER_USAGE),
    group("waste", WASTE),
    group("derived_metrics", DERIVED_METRICS),
    group("ai_analysis", AI_ANALYSIS),
];

pub const ENVIRONMENTAL: Template = Template {
    name: "environmental",
    fields: &[
        text("category"),
        count("file_count"),
        count("record_count"),
        group("partial_analysis", PARTIAL_ANALYSIS),
    ],
};

const FINANCIALS: &[FieldSpec] = &[
    number("total_revenue"),
    number("total_cost"),
    number("total_profit"),
    number("total_loss"),
    number("total_tax"),
    number("total_debt"),
    number("total_cash"),
    number("total_asset"),
    number("total_equity"),
    number("gross_margin"),
    number("gross_margin_pct"),
    number("net_margin_pct"),
    number("debt_to_equity"),
];

const FINANCIAL_AI_ANALYSIS: &[FieldSpec] =
    &[list("comments"), map("summaries"), map("confidence_scores")];

pub const FINANCIAL: Template = Template {
    name: "financial",
    fields: &[
        text("category"),
        count("file_count"),
        count("record_count"),
        map("numeric_overview"),
        group("financials", FINANCIALS),
        list("monthly_trends"),
        group("ai_analysis", FINANCIAL_AI_ANALYSIS),
    ],
};

const COMPANY_INFO: &[FieldSpec] = &[
    text("company_name"),
    text("registration_number"),
    text("reporting_year_start"),
    text("reporting_year_end"),
    count("total_employees"),
    list("sites"),
    text("industry_sector"),
    text("headquarters_location"),
    text("report_prepared_by"),
];

const FINANCIAL_DATA: &[FieldSpec] = &[
    number("annual_turnover_gbp"),
    number("annual_revenue_gbp"),
    number("annual_operating_costs_gbp"),
    number("capital_expenditure_gbp"),
];

const ELECTRICITY_BY_SOURCE: &[FieldSpec] = &[
    number("grid_kwh"),
    number("renewable_kwh"),
    number("on_site_generation_kwh"),
];

const OTHER_FUELS_KWH: &[FieldSpec] = &[
    number("diesel_kwh"),
    number("petrol_kwh"),
    number("lpg_kwh"),
    number("other_kwh"),
];

const ENERGY_CONSUMPTION: &[FieldSpec] = &[
    number("total_energy_kwh"),
    number("electricity_kwh"),
    group("electricity_kwh_by_source", ELECTRICITY_BY_SOURCE),
    number("natural_gas_kwh"),
    group("other_fuels_kwh", OTHER_FUELS_KWH),
    number("steam_kwh"),
    number("heat_kwh"),
    number("cooling_kwh"),
];

const SCOPE1: &[FieldSpec] = &[
    number("stationary_combustion_tco2e"),
    number("mobile_combustion_tco2e"),
    number("fugitive_emissions_tco2e"),
];

const SCOPE2: &[FieldSpec] = &[number("location_based_tco2e"), number("market_based_tco2e")];

const SCOPE3: &[FieldSpec] = &[
    number("purchased_goods_and_services_tco2e"),
    number("capital_goods_tco2e"),
    number("fuel_and_energy_related_activities_tco2e"),
    number("upstream_transport_tco2e"),
    number("waste_generated_in_operations_tco2e"),
    number("business_travel_tco2e"),
    number("employee_commuting_tco2e"),
    number("downstream_transport_tco2e"),
    number("use_of_sold_products_tco2e"),
    number("end_of_life_treatment_tco2e"),
];

const SECR_EMISSIONS: &[FieldSpec] = &[
    number("total_emissions_tco2e"),
    group("scope1_tco2e", SCOPE1),
    group("scope2_tco2e", SCOPE2),
    group("scope3_tco2e", SCOPE3),
];

const INTENSITY_METRICS: &[FieldSpec] = &[
    number("emissions_per_employee_tco2e"),
    number("emissions_per_million_gbp_revenue_tco2e"),
    number("emissions_per_square_meter_tco2e"),
    number("emissions_per_tonne_output_tco2e"),
];

const FUEL_CONSUMPTION_LITRES: &[FieldSpec] = &[
    number("diesel_litres"),
    number("petrol_litres"),
    number("lpg_litres"),
    number("other_litres"),
];

const FLEET: &[FieldSpec] = &[
    count("total_vehicles"),
    count("diesel_vehicles"),
    count("petrol_vehicles"),
    count("electric_vehicles"),
    count("hybrid_vehicles"),
    number("total_distance_travelled_km"),
    group("fuel_consumption_litres", FUEL_CONSUMPTION_LITRES),
];

const BUSINESS_TRAVEL: &[FieldSpec] = &[
    number("air_km"),
    number("rail_km"),
    number("car_km"),
    number("public_transport_km"),
];

const TRANSPORTATION: &[FieldSpec] = &[
    group("fleet", FLEET),
    group("business_travel", BUSINESS_TRAVEL),
];

const WASTE_MANAGEMENT: &[FieldSpec] = &[
    number("total_waste_tonnes"),
    number("waste_recycled_tonnes"),
    number("waste_to_landfill_tonnes"),
    number("waste_incinerated_tonnes"),
    number("hazardous_waste_tonnes"),
];

const WATER_CONSUMPTION: &[FieldSpec] = &[
    number("total_water_m3"),
    number("potable_water_m3"),
    number("non_potable_water_m3"),
    number("recycled_water_m3"),
];

const CONSTRUCTION_MATERIALS: &[FieldSpec] = &[
    number("cement_tonnes"),
    number("steel_tonnes"),
    number("timber_tonnes"),
    number("asphalt_tonnes"),
    number("glass_tonnes"),
    number("recycled_materials_tonnes"),
];

const RENEWABLE_ENERGY: &[FieldSpec] = &[
    number("on_site_solar_kwh"),
    number("on_site_wind_kwh"),
    number("purchased_renewable_kwh"),
    number("renewable_percentage"),
];

const COMPLIANCE: &[FieldSpec] = &[
    text("reporting_standard"),
    text("emission_factors_source"),
    text("verification_status"),
    text("verification_body"),
];

/// Streamlined Energy and Carbon Reporting layout.
pub const SECR: Template = Template {
    name: "secr",
    fields: &[
        text("category"),
        count("file_count"),
        count("record_count"),
        group("company_info", COMPANY_INFO),
        group("financial_data", FINANCIAL_DATA),
        group("energy_consumption", ENERGY_CONSUMPTION),
        group("emissions", SECR_EMISSIONS),
        group("intensity_metrics", INTENSITY_METRICS),
        group("transportation", TRANSPORTATION),
        group("waste_management", WASTE_MANAGEMENT),
        group("water_consumption", WATER_CONSUMPTION),
        group("construction_materials", CONSTRUCTION_MATERIALS),
        group("renewable_energy", RENEWABLE_ENERGY),
        group("compliance", COMPLIANCE),
        text("notes"),
    ],
};
