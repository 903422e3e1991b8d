/// Idempotent DDL for the tables below; applied on startup.
pub const SCHEMA_SQL: &str = include_str!("../schema.sql");

#[allow(warnings, clippy::all)]
pub mod paste {
    use sea_orm::entity::prelude::*;

    #[sea_orm::model]
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "pastes")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        #[sea_orm(column_type = "Text")]
        pub content: String,
        pub max_views: Option<i32>,
        pub views_count: i32,
        pub expires_at: Option<TimeDateTimeWithTimeZone>,
        pub created_at: TimeDateTimeWithTimeZone,
    }

    impl ActiveModelBehavior for ActiveModel {}
}
