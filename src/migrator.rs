use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_users_table::Migration),
            Box::new(m20260101_000002_create_products_table::Migration),
            Box::new(m20260101_000003_create_orders_table::Migration),
            Box::new(m20260101_000004_create_returns_table::Migration),
            Box::new(m20260101_000005_create_promo_codes_table::Migration),
            Box::new(m20260101_000006_create_support_tickets_table::Migration),
            Box::new(m20260101_000007_create_reviews_table::Migration),
            Box::new(m20260101_000008_create_cms_tables::Migration),
        ]
    }
}

fn timestamp_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).timestamp_with_time_zone().not_null().to_owned()
}

fn money_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .decimal_len(12, 2)
        .not_null()
        .default(0)
        .to_owned()
}

mod m20260101_000001_create_users_table {
    use super::timestamp_col;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::Mobile).string_len(20).null().unique_key())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::Role).string_len(16).not_null())
                        .col(ColumnDef::new(Users::Addresses).json().not_null())
                        .col(ColumnDef::new(Users::Wishlist).json().not_null())
                        .col(timestamp_col(Users::CreatedAt))
                        .col(timestamp_col(Users::UpdatedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Name,
        Email,
        Mobile,
        PasswordHash,
        Role,
        Addresses,
        Wishlist,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000002_create_products_table {
    use super::{money_col, timestamp_col};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Slug).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::Description).text().not_null())
                        .col(ColumnDef::new(Products::Category).string_len(64).not_null())
                        .col(ColumnDef::new(Products::Material).string().null())
                        .col(ColumnDef::new(Products::Dimensions).string().null())
                        .col(money_col(Products::Price))
                        .col(
                            ColumnDef::new(Products::Discount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::StockStatus).string_len(20).not_null())
                        .col(ColumnDef::new(Products::Images).json().not_null())
                        .col(ColumnDef::new(Products::Tags).json().not_null())
                        .col(ColumnDef::new(Products::Highlight).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Products::Featured)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(timestamp_col(Products::CreatedAt))
                        .col(timestamp_col(Products::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_category")
                        .table(Products::Table)
                        .col(Products::Category)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Slug,
        Description,
        Category,
        Material,
        Dimensions,
        Price,
        Discount,
        StockStatus,
        Images,
        Tags,
        Highlight,
        Featured,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000003_create_orders_table {
    use super::{money_col, timestamp_col};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000003_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                        // unique index turns a concurrent number collision into a retryable error
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Items).json().not_null())
                        .col(ColumnDef::new(Orders::ShippingAddress).json().not_null())
                        .col(ColumnDef::new(Orders::BillingAddress).json().null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string_len(16).not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string_len(16).not_null())
                        .col(ColumnDef::new(Orders::GatewayOrderId).string().null())
                        .col(ColumnDef::new(Orders::TransactionId).string().null())
                        .col(
                            ColumnDef::new(Orders::PaidAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::Currency).string_len(3).not_null())
                        .col(money_col(Orders::Subtotal))
                        .col(money_col(Orders::DiscountAmount))
                        .col(money_col(Orders::ShippingCost))
                        .col(money_col(Orders::GiftWrapCost))
                        .col(money_col(Orders::TaxAmount))
                        .col(money_col(Orders::Total))
                        .col(ColumnDef::new(Orders::PromoCode).string_len(32).null())
                        .col(
                            ColumnDef::new(Orders::GiftWrap)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Orders::GiftMessage).string_len(500).null())
                        .col(ColumnDef::new(Orders::Gstin).string_len(15).null())
                        .col(ColumnDef::new(Orders::GstBusinessName).string().null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::TrackingNumber).string().null())
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(ColumnDef::new(Orders::Timeline).json().not_null())
                        .col(timestamp_col(Orders::CreatedAt))
                        .col(timestamp_col(Orders::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                ("idx_orders_user_id", Orders::UserId),
                ("idx_orders_status", Orders::Status),
                ("idx_orders_gateway_order_id", Orders::GatewayOrderId),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(Orders::Table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        UserId,
        Items,
        ShippingAddress,
        BillingAddress,
        PaymentMethod,
        PaymentStatus,
        GatewayOrderId,
        TransactionId,
        PaidAt,
        Currency,
        Subtotal,
        DiscountAmount,
        ShippingCost,
        GiftWrapCost,
        TaxAmount,
        Total,
        PromoCode,
        GiftWrap,
        GiftMessage,
        Gstin,
        GstBusinessName,
        Status,
        TrackingNumber,
        Notes,
        Timeline,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000004_create_returns_table {
    use super::{money_col, timestamp_col};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000004_create_returns_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Returns::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Returns::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Returns::ReturnNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Returns::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Returns::UserId).uuid().not_null())
                        .col(ColumnDef::new(Returns::Items).json().not_null())
                        .col(ColumnDef::new(Returns::Comments).text().null())
                        .col(ColumnDef::new(Returns::Images).json().not_null())
                        .col(ColumnDef::new(Returns::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Returns::AdminNote).text().null())
                        .col(money_col(Returns::RefundAmount))
                        .col(ColumnDef::new(Returns::RefundStatus).string_len(20).not_null())
                        .col(ColumnDef::new(Returns::RefundGatewayId).string().null())
                        .col(
                            ColumnDef::new(Returns::RefundProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Returns::Timeline).json().not_null())
                        .col(timestamp_col(Returns::CreatedAt))
                        .col(timestamp_col(Returns::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_returns_order_id")
                        .table(Returns::Table)
                        .col(Returns::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_returns_refund_gateway_id")
                        .table(Returns::Table)
                        .col(Returns::RefundGatewayId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Returns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Returns {
        Table,
        Id,
        ReturnNumber,
        OrderId,
        UserId,
        Items,
        Comments,
        Images,
        Status,
        AdminNote,
        RefundAmount,
        RefundStatus,
        RefundGatewayId,
        RefundProcessedAt,
        Timeline,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000005_create_promo_codes_table {
    use super::{money_col, timestamp_col};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000005_create_promo_codes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PromoCodes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(PromoCodes::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(PromoCodes::Code)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PromoCodes::Description).string().null())
                        .col(ColumnDef::new(PromoCodes::DiscountType).string_len(16).not_null())
                        .col(money_col(PromoCodes::Value))
                        .col(money_col(PromoCodes::MinOrderValue))
                        .col(ColumnDef::new(PromoCodes::MaxDiscount).decimal_len(12, 2).null())
                        .col(timestamp_col(PromoCodes::ValidFrom))
                        .col(
                            ColumnDef::new(PromoCodes::ValidUntil)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PromoCodes::UsageLimit).integer().null())
                        .col(
                            ColumnDef::new(PromoCodes::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PromoCodes::UsedBy).json().not_null())
                        .col(
                            ColumnDef::new(PromoCodes::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(timestamp_col(PromoCodes::CreatedAt))
                        .col(timestamp_col(PromoCodes::UpdatedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PromoCodes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PromoCodes {
        Table,
        Id,
        Code,
        Description,
        DiscountType,
        Value,
        MinOrderValue,
        MaxDiscount,
        ValidFrom,
        ValidUntil,
        UsageLimit,
        UsageCount,
        UsedBy,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000006_create_support_tickets_table {
    use super::timestamp_col;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000006_create_support_tickets_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SupportTickets::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupportTickets::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(SupportTickets::TicketNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SupportTickets::UserId).uuid().not_null())
                        .col(ColumnDef::new(SupportTickets::Subject).string().not_null())
                        .col(ColumnDef::new(SupportTickets::Category).string_len(16).not_null())
                        .col(ColumnDef::new(SupportTickets::Priority).string_len(16).not_null())
                        .col(ColumnDef::new(SupportTickets::OrderId).uuid().null())
                        .col(ColumnDef::new(SupportTickets::Status).string_len(16).not_null())
                        .col(ColumnDef::new(SupportTickets::Messages).json().not_null())
                        .col(timestamp_col(SupportTickets::CreatedAt))
                        .col(timestamp_col(SupportTickets::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_support_tickets_user_id")
                        .table(SupportTickets::Table)
                        .col(SupportTickets::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SupportTickets::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SupportTickets {
        Table,
        Id,
        TicketNumber,
        UserId,
        Subject,
        Category,
        Priority,
        OrderId,
        Status,
        Messages,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000007_create_reviews_table {
    use super::timestamp_col;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000007_create_reviews_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Reviews::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Reviews::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Reviews::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Reviews::UserId).uuid().not_null())
                        .col(ColumnDef::new(Reviews::ReviewerName).string().not_null())
                        .col(ColumnDef::new(Reviews::Rating).integer().not_null())
                        .col(ColumnDef::new(Reviews::Title).string().null())
                        .col(ColumnDef::new(Reviews::Comment).text().not_null())
                        .col(
                            ColumnDef::new(Reviews::VerifiedPurchase)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Reviews::IsApproved)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(timestamp_col(Reviews::CreatedAt))
                        .col(timestamp_col(Reviews::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reviews_user_product")
                        .table(Reviews::Table)
                        .col(Reviews::UserId)
                        .col(Reviews::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reviews_product_id")
                        .table(Reviews::Table)
                        .col(Reviews::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Reviews::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Reviews {
        Table,
        Id,
        ProductId,
        UserId,
        ReviewerName,
        Rating,
        Title,
        Comment,
        VerifiedPurchase,
        IsApproved,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000008_create_cms_tables {
    use super::timestamp_col;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000008_create_cms_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Projects::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Projects::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Projects::Title).string().not_null())
                        .col(ColumnDef::new(Projects::Slug).string().not_null().unique_key())
                        .col(ColumnDef::new(Projects::Description).text().not_null())
                        .col(ColumnDef::new(Projects::Location).string().null())
                        .col(ColumnDef::new(Projects::Category).string().null())
                        .col(ColumnDef::new(Projects::Images).json().not_null())
                        .col(
                            ColumnDef::new(Projects::Featured)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Projects::IsPublished)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(timestamp_col(Projects::CreatedAt))
                        .col(timestamp_col(Projects::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Testimonials::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Testimonials::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Testimonials::AuthorName).string().not_null())
                        .col(ColumnDef::new(Testimonials::AuthorTitle).string().null())
                        .col(ColumnDef::new(Testimonials::Quote).text().not_null())
                        .col(ColumnDef::new(Testimonials::Rating).integer().null())
                        .col(ColumnDef::new(Testimonials::AvatarUrl).string().null())
                        .col(
                            ColumnDef::new(Testimonials::IsPublished)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Testimonials::DisplayOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(timestamp_col(Testimonials::CreatedAt))
                        .col(timestamp_col(Testimonials::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(HomepageSections::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(HomepageSections::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(HomepageSections::Key)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(HomepageSections::Title).string().null())
                        .col(ColumnDef::new(HomepageSections::Subtitle).string().null())
                        .col(ColumnDef::new(HomepageSections::Content).json().not_null())
                        .col(
                            ColumnDef::new(HomepageSections::DisplayOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(HomepageSections::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(timestamp_col(HomepageSections::CreatedAt))
                        .col(timestamp_col(HomepageSections::UpdatedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(HomepageSections::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Testimonials::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Projects::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Projects {
        Table,
        Id,
        Title,
        Slug,
        Description,
        Location,
        Category,
        Images,
        Featured,
        IsPublished,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Testimonials {
        Table,
        Id,
        AuthorName,
        AuthorTitle,
        Quote,
        Rating,
        AvatarUrl,
        IsPublished,
        DisplayOrder,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum HomepageSections {
        Table,
        Id,
        Key,
        Title,
        Subtitle,
        Content,
        DisplayOrder,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}
