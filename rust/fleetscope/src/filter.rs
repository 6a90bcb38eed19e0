//! Filter selections and the SQL predicate they compile into.

use serde::{Deserialize, Serialize};

/// One dimension an operator may constrain. The declaration order is the
/// order conjuncts appear in the rendered predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Region,
    Vertical,
    Organization,
    Industry,
    AccountStatus,
    Vendor,
    DeviceCategory,
    DeviceTypeFamily,
    DeviceSubcategory,
    Model,
    OsName,
    MacOui,
}

impl FilterField {
    pub const ALL: [FilterField; 12] = [
        FilterField::Region,
        FilterField::Vertical,
        FilterField::Organization,
        FilterField::Industry,
        FilterField::AccountStatus,
        FilterField::Vendor,
        FilterField::DeviceCategory,
        FilterField::DeviceTypeFamily,
        FilterField::DeviceSubcategory,
        FilterField::Model,
        FilterField::OsName,
        FilterField::MacOui,
    ];

    /// Fact-table column the field filters on. `MacOui` names the
    /// array-valued column its membership test runs against.
    pub fn column(self) -> &'static str {
        match self {
            FilterField::Region => "region",
            FilterField::Vertical => "vertical",
            FilterField::Organization => "organization",
            FilterField::Industry => "industry",
            FilterField::AccountStatus => "account_status",
            FilterField::Vendor => "vendor",
            FilterField::DeviceCategory => "device_category",
            FilterField::DeviceTypeFamily => "device_type_family",
            FilterField::DeviceSubcategory => "device_subcategory",
            FilterField::Model => "model",
            FilterField::OsName => "os_name",
            FilterField::MacOui => "mac_oui_list",
        }
    }

    fn is_membership(self) -> bool {
        matches!(self, FilterField::MacOui)
    }
}

/// A submitted combination of filter values. All-`None` is the identity
/// selection and matches everything. Compared structurally for cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSelection {
    pub region: Option<String>,
    pub vertical: Option<String>,
    pub organization: Option<String>,
    pub industry: Option<String>,
    pub account_status: Option<String>,
    pub vendor: Option<String>,
    pub device_category: Option<String>,
    pub device_type_family: Option<String>,
    pub device_subcategory: Option<String>,
    pub model: Option<String>,
    pub os_name: Option<String>,
    pub mac_oui: Option<String>,
}

impl FilterSelection {
    pub fn get(&self, field: FilterField) -> Option<&str> {
        let value = match field {
            FilterField::Region => &self.region,
            FilterField::Vertical => &self.vertical,
            FilterField::Organization => &self.organization,
            FilterField::Industry => &self.industry,
            FilterField::AccountStatus => &self.account_status,
            FilterField::Vendor => &self.vendor,
            FilterField::DeviceCategory => &self.device_category,
            FilterField::DeviceTypeFamily => &self.device_type_family,
            FilterField::DeviceSubcategory => &self.device_subcategory,
            FilterField::Model => &self.model,
            FilterField::OsName => &self.os_name,
            FilterField::MacOui => &self.mac_oui,
        };
        value.as_deref()
    }

    /// Set fields in predicate order.
    pub fn entries<'a>(&'a self) -> impl Iterator<Item = (FilterField, &'a str)> + 'a {
        FilterField::ALL
            .into_iter()
            .filter_map(|field| self.get(field).map(|value| (field, value)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    pub fn active_count(&self) -> usize {
        self.entries().count()
    }

    /// Render the WHERE-clause predicate: one conjunct per set field,
    /// joined by AND, `1=1` when nothing is set.
    pub fn predicate(&self) -> String {
        self.render(None)
    }

    /// Aliased variant for join-style queries; every column reference is
    /// qualified with `alias.`.
    pub fn predicate_with_alias(&self, alias: &str) -> String {
        self.render(Some(alias))
    }

    fn render(&self, alias: Option<&str>) -> String {
        let conjuncts: Vec<String> = self
            .entries()
            .map(|(field, value)| {
                let column = match alias {
                    Some(alias) => format!("{alias}.{}", field.column()),
                    None => field.column().to_string(),
                };
                if field.is_membership() {
                    format!("array_contains({column}, '{}')", escape_literal(value))
                } else {
                    format!("{column} = '{}'", escape_literal(value))
                }
            })
            .collect();

        if conjuncts.is_empty() {
            "1=1".to_string()
        } else {
            conjuncts.join(" AND ")
        }
    }
}

/// Escape a string for interpolation into a single-quoted SQL literal.
/// The store's literal syntax terminates only on an unescaped single
/// quote, so doubling every quote is the complete escaping rule.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vendor_selection(vendor: &str) -> FilterSelection {
        FilterSelection {
            vendor: Some(vendor.to_string()),
            ..FilterSelection::default()
        }
    }

    #[test]
    fn empty_selection_renders_always_true() {
        assert_eq!(FilterSelection::default().predicate(), "1=1");
        assert_eq!(FilterSelection::default().predicate_with_alias("d"), "1=1");
    }

    #[test]
    fn single_field_renders_equality() {
        assert_eq!(vendor_selection("Acme").predicate(), "vendor = 'Acme'");
    }

    #[test]
    fn conjuncts_follow_declared_field_order() {
        let selection = FilterSelection {
            os_name: Some("Linux".into()),
            region: Some("EMEA".into()),
            vendor: Some("Acme".into()),
            ..FilterSelection::default()
        };
        assert_eq!(
            selection.predicate(),
            "region = 'EMEA' AND vendor = 'Acme' AND os_name = 'Linux'"
        );
    }

    #[test]
    fn mac_oui_renders_membership_test() {
        let selection = FilterSelection {
            mac_oui: Some("00:1A:2B".into()),
            ..FilterSelection::default()
        };
        assert_eq!(
            selection.predicate(),
            "array_contains(mac_oui_list, '00:1A:2B')"
        );
    }

    #[test]
    fn alias_qualifies_every_column() {
        let selection = FilterSelection {
            region: Some("EMEA".into()),
            mac_oui: Some("00:1A:2B".into()),
            ..FilterSelection::default()
        };
        assert_eq!(
            selection.predicate_with_alias("d"),
            "d.region = 'EMEA' AND array_contains(d.mac_oui_list, '00:1A:2B')"
        );
    }

    #[test]
    fn single_quotes_are_doubled() {
        assert_eq!(
            vendor_selection("O'Brien").predicate(),
            "vendor = 'O''Brien'"
        );
    }

    #[test]
    fn injection_attempt_stays_inside_the_literal() {
        let predicate = vendor_selection("'; DROP TABLE x; --").predicate();
        assert_eq!(predicate, "vendor = '''; DROP TABLE x; --'");
        // Every quote in the rendered value is doubled, so the literal
        // never terminates early.
        let value = predicate
            .strip_prefix("vendor = '")
            .and_then(|rest| rest.strip_suffix('\''))
            .unwrap();
        let mut chars = value.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                assert_eq!(chars.next(), Some('\''), "unescaped quote in {value}");
            }
        }
    }

    #[test]
    fn selection_equality_is_structural() {
        let a = vendor_selection("Acme");
        let b = vendor_selection("Acme");
        assert_eq!(a, b);
        assert_ne!(a, vendor_selection("Other"));
    }
}
