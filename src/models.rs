//! # Region Hierarchy Model
//!
//! Two entities: a [`Region`] owns many [`District`]s through
//! `districts.region_id`. Regions are read-only once imported; districts can be
//! renamed and deleted.

use std::fmt;

use sqlx::FromRow;

use crate::errors::StoreError;
use crate::store::{Column, Entity, Fields, Filter, Store, ValueKind};

/// Maximum length of a region or district name (the column is `VARCHAR(255)`)
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Region {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionField {
    Id,
    Name,
}

impl Column for RegionField {
    const ALL: &'static [Self] = &[RegionField::Id, RegionField::Name];
    const PRIMARY_KEY: Self = RegionField::Id;

    fn name(self) -> &'static str {
        match self {
            RegionField::Id => "id",
            RegionField::Name => "name",
        }
    }

    fn kind(self) -> ValueKind {
        match self {
            RegionField::Id => ValueKind::Int,
            RegionField::Name => ValueKind::Text,
        }
    }

    fn is_required(self) -> bool {
        self == RegionField::Name
    }
}

impl Entity for Region {
    type Field = RegionField;
    const TABLE: &'static str = "regions";

    fn id(&self) -> i64 {
        self.id
    }
}

impl Region {
    pub fn fields(name: impl Into<String>) -> Fields<RegionField> {
        Fields::new().with(RegionField::Name, name.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct District {
    pub id: i64,
    pub name: String,
    pub region_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistrictField {
    Id,
    Name,
    RegionId,
}

impl Column for DistrictField {
    const ALL: &'static [Self] = &[
        DistrictField::Id,
        DistrictField::Name,
        DistrictField::RegionId,
    ];
    const PRIMARY_KEY: Self = DistrictField::Id;

    fn name(self) -> &'static str {
        match self {
            DistrictField::Id => "id",
            DistrictField::Name => "name",
            DistrictField::RegionId => "region_id",
        }
    }

    fn kind(self) -> ValueKind {
        match self {
            DistrictField::Name => ValueKind::Text,
            DistrictField::Id | DistrictField::RegionId => ValueKind::Int,
        }
    }

    fn is_required(self) -> bool {
        !self.is_primary_key()
    }
}

impl Entity for District {
    type Field = DistrictField;
    const TABLE: &'static str = "districts";

    fn id(&self) -> i64 {
        self.id
    }
}

impl District {
    pub fn fields(name: impl Into<String>, region_id: i64) -> Fields<DistrictField> {
        Fields::new()
            .with(DistrictField::Name, name.into())
            .with(DistrictField::RegionId, region_id)
    }

    pub fn rename(name: impl Into<String>) -> Fields<DistrictField> {
        Fields::new().with(DistrictField::Name, name.into())
    }
}

impl fmt::Display for District {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.id, self.name)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.id, self.name)
    }
}

/// Both entity stores over one shared pool, with the relationship lookups
#[derive(Clone)]
pub struct Hierarchy {
    pub regions: Store<Region>,
    pub districts: Store<District>,
}

impl Hierarchy {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            regions: Store::new(pool.clone()),
            districts: Store::new(pool),
        }
    }

    /// Districts belonging to a region, in creation order
    pub async fn districts_of(&self, region_id: i64) -> Result<Vec<District>, StoreError> {
        self.districts
            .filter(Filter::new().eq(DistrictField::RegionId, region_id))
            .await
    }

    pub async fn region_of(&self, district: &District) -> Result<Option<Region>, StoreError> {
        self.regions.get(district.region_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_and_column_names() {
        assert_eq!(Region::TABLE, "regions");
        assert_eq!(District::TABLE, "districts");
        assert_eq!(Region::select_columns(), "id, name");
        assert_eq!(District::select_columns(), "id, name, region_id");
        assert_eq!(District::primary_key(), "id");
    }

    #[test]
    fn test_required_fields() {
        let required: Vec<_> = DistrictField::ALL
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name())
            .collect();
        assert_eq!(required, vec!["name", "region_id"]);

        let required: Vec<_> = RegionField::ALL
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name())
            .collect();
        assert_eq!(required, vec!["name"]);
    }

    #[test]
    fn test_district_display() {
        let district = District {
            id: 7,
            name: "Downtown".to_string(),
            region_id: 3,
        };
        assert_eq!(district.to_string(), "7 - Downtown");
    }

    #[test]
    fn test_district_field_map() {
        let fields = District::fields("Chilonzor", 1);
        assert_eq!(fields.len(), 2);
        assert!(fields.contains(DistrictField::RegionId));
        assert!(!fields.contains(DistrictField::Id));
    }
}
