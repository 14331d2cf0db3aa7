use clap::ValueEnum;

/// The five datasets this connector knows how to extract and load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    InventoryDaily,
    FillRate,
    GeoMonthly,
    AudienceInterest,
    AudienceDemographics,
}

impl ReportType {
    pub fn all() -> Vec<ReportType> {
        vec![
            ReportType::InventoryDaily,
            ReportType::FillRate,
            ReportType::GeoMonthly,
            ReportType::AudienceInterest,
            ReportType::AudienceDemographics,
        ]
    }

    pub fn token(&self) -> &'static str {
        match self {
            ReportType::InventoryDaily => "INVENTORY_DAILY",
            ReportType::FillRate => "FILL_RATE",
            ReportType::GeoMonthly => "GEO_MONTHLY",
            ReportType::AudienceInterest => "AUDIENCE_INTEREST",
            ReportType::AudienceDemographics => "AUDIENCE_DEMOGRAPHICS",
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Per-field type-conversion directive applied after column renaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convert {
    /// Parse a `YYYY-MM-DD` string as a calendar date.
    Date,
    /// Decode an 8-digit `YYYYMMDD` integer as a calendar date.
    DateInt,
    /// Decode the reporting service's compact month encoding
    /// (`(year - 2010) * 100 + month_0indexed`) to the first day of the month.
    MonthYear,
    Int64,
    Float64,
    /// Force a string representation; the service returns bare `0` for
    /// unknown categorical values.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Date,
    Text,
    Int64,
    Float64,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnType,
    pub nullable: bool,
}

const fn col(name: &'static str, kind: ColumnType) -> Column {
    Column {
        name,
        kind,
        nullable: true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionGranularity {
    Day,
    Month,
}

#[derive(Debug, Clone, Copy)]
pub struct Partitioning {
    pub field: &'static str,
    pub granularity: PartitionGranularity,
}

/// Static configuration for one report type: what to request from the
/// reporting service, how to rename and convert the columns, and the
/// warehouse table shape the result lands in.
#[derive(Debug, Clone)]
pub struct ReportSpec {
    pub report_type: ReportType,
    /// Identifier of a report pre-configured on the service, if one exists.
    /// When set, scheduled runs execute that report instead of submitting a
    /// dynamic definition.
    pub saved_report_id: Option<&'static str>,
    pub dimensions: Vec<&'static str>,
    pub metrics: Vec<&'static str>,
    /// Source column name to target field name; unmapped source columns are
    /// dropped.
    pub rename: Vec<(&'static str, &'static str)>,
    /// Target field name to conversion directive.
    pub conversions: Vec<(&'static str, Convert)>,
    /// Final column list; anything else is pruned after mapping.
    pub columns: Vec<Column>,
    pub table: &'static str,
    pub partition: Partitioning,
}

impl ReportSpec {
    pub fn for_report(report_type: ReportType) -> ReportSpec {
        match report_type {
            ReportType::InventoryDaily => inventory_daily(),
            ReportType::FillRate => fill_rate(),
            ReportType::GeoMonthly => geo_monthly(),
            ReportType::AudienceInterest => audience_interest(),
            ReportType::AudienceDemographics => audience_demographics(),
        }
    }

    /// Source column names in the positional order the service returns row
    /// values: dimensions first, then metrics.
    pub fn source_columns(&self) -> Vec<&'static str> {
        self.dimensions
            .iter()
            .chain(self.metrics.iter())
            .copied()
            .collect()
    }

    pub fn conversion_for(&self, field: &str) -> Option<Convert> {
        self.conversions
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, convert)| *convert)
    }
}

fn inventory_daily() -> ReportSpec {
    ReportSpec {
        report_type: ReportType::InventoryDaily,
        saved_report_id: None,
        dimensions: vec![
            "DATE",
            "AD_UNIT_NAME_LEVEL_1",
            "AD_UNIT_NAME_LEVEL_2",
            "ORDER_NAME",
            "DEVICE_CATEGORY_NAME",
            "CREATIVE_SIZE",
        ],
        metrics: vec![
            "AD_SERVER_IMPRESSIONS",
            "AD_SERVER_CLICKS",
            "AD_SERVER_ACTIVE_VIEW_MEASURABLE_IMPRESSIONS",
            "AD_SERVER_ACTIVE_VIEW_VIEWABLE_IMPRESSIONS",
        ],
        rename: vec![
            ("DATE", "date"),
            ("AD_UNIT_NAME_LEVEL_1", "ad_unit_top_level"),
            ("AD_UNIT_NAME_LEVEL_2", "ad_unit_name"),
            ("ORDER_NAME", "order_name"),
            ("DEVICE_CATEGORY_NAME", "device_category"),
            ("CREATIVE_SIZE", "creative_size"),
            ("AD_SERVER_IMPRESSIONS", "ad_server_impressions"),
            ("AD_SERVER_CLICKS", "ad_server_clicks"),
            (
                "AD_SERVER_ACTIVE_VIEW_MEASURABLE_IMPRESSIONS",
                "active_view_measurable_impressions",
            ),
            (
                "AD_SERVER_ACTIVE_VIEW_VIEWABLE_IMPRESSIONS",
                "active_view_viewable_impressions",
            ),
        ],
        conversions: vec![
            ("date", Convert::DateInt),
            ("ad_server_impressions", Convert::Int64),
            ("ad_server_clicks", Convert::Int64),
            ("active_view_measurable_impressions", Convert::Int64),
            ("active_view_viewable_impressions", Convert::Int64),
        ],
        columns: vec![
            col("date", ColumnType::Date),
            col("ad_unit_top_level", ColumnType::Text),
            col("ad_unit_name", ColumnType::Text),
            col("order_name", ColumnType::Text),
            col("device_category", ColumnType::Text),
            col("creative_size", ColumnType::Text),
            col("ad_server_impressions", ColumnType::Int64),
            col("ad_server_clicks", ColumnType::Int64),
            col("active_view_measurable_impressions", ColumnType::Int64),
            col("active_view_viewable_impressions", ColumnType::Int64),
        ],
        table: "report_inventory_daily",
        partition: Partitioning {
            field: "date",
            granularity: PartitionGranularity::Day,
        },
    }
}

fn fill_rate() -> ReportSpec {
    ReportSpec {
        report_type: ReportType::FillRate,
        saved_report_id: None,
        dimensions: vec!["DATE", "AD_UNIT_NAME_LEVEL_1"],
        metrics: vec![
            "UNFILLED_IMPRESSIONS",
            "CODE_SERVED_COUNT",
            "RESPONSES_SERVED",
            "AD_SERVER_IMPRESSIONS",
            "FILL_RATE",
            "AD_REQUESTS",
        ],
        rename: vec![
            ("DATE", "date"),
            ("AD_UNIT_NAME_LEVEL_1", "ad_unit_name"),
            ("UNFILLED_IMPRESSIONS", "unfilled_impressions"),
            ("CODE_SERVED_COUNT", "code_served_count"),
            ("RESPONSES_SERVED", "responses_served"),
            ("AD_SERVER_IMPRESSIONS", "ad_server_impressions"),
            ("FILL_RATE", "fill_rate"),
            ("AD_REQUESTS", "ad_requests"),
        ],
        conversions: vec![
            ("date", Convert::DateInt),
            ("unfilled_impressions", Convert::Int64),
            ("code_served_count", Convert::Int64),
            ("responses_served", Convert::Int64),
            ("ad_server_impressions", Convert::Int64),
            ("fill_rate", Convert::Float64),
            ("ad_requests", Convert::Int64),
        ],
        columns: vec![
            col("date", ColumnType::Date),
            col("ad_unit_name", ColumnType::Text),
            col("unfilled_impressions", ColumnType::Int64),
            col("code_served_count", ColumnType::Int64),
            col("responses_served", ColumnType::Int64),
            col("ad_server_impressions", ColumnType::Int64),
            col("fill_rate", ColumnType::Float64),
            col("ad_requests", ColumnType::Int64),
        ],
        table: "report_fill_rate",
        partition: Partitioning {
            field: "date",
            granularity: PartitionGranularity::Day,
        },
    }
}

fn geo_monthly() -> ReportSpec {
    ReportSpec {
        report_type: ReportType::GeoMonthly,
        saved_report_id: None,
        dimensions: vec!["MONTH_AND_YEAR", "COUNTRY_ID", "COUNTRY_NAME"],
        metrics: vec![
            "AD_SERVER_IMPRESSIONS",
            "AD_SERVER_CLICKS",
            "AD_SERVER_ACTIVE_VIEW_MEASURABLE_IMPRESSIONS_RATE",
            "AD_SERVER_ACTIVE_VIEW_VIEWABLE_IMPRESSIONS",
        ],
        rename: vec![
            ("MONTH_AND_YEAR", "report_date"),
            ("COUNTRY_ID", "country_code"),
            ("COUNTRY_NAME", "country_name"),
            ("AD_SERVER_IMPRESSIONS", "ad_server_impressions"),
            ("AD_SERVER_CLICKS", "ad_server_clicks"),
            (
                "AD_SERVER_ACTIVE_VIEW_MEASURABLE_IMPRESSIONS_RATE",
                "active_view_measurable_rate",
            ),
            (
                "AD_SERVER_ACTIVE_VIEW_VIEWABLE_IMPRESSIONS",
                "active_view_viewable_impressions",
            ),
        ],
        conversions: vec![
            ("report_date", Convert::MonthYear),
            ("country_code", Convert::Text),
            ("ad_server_impressions", Convert::Int64),
            ("ad_server_clicks", Convert::Int64),
            ("active_view_measurable_rate", Convert::Float64),
            ("active_view_viewable_impressions", Convert::Int64),
        ],
        columns: vec![
            col("report_date", ColumnType::Date),
            col("country_code", ColumnType::Text),
            col("country_name", ColumnType::Text),
            col("ad_server_impressions", ColumnType::Int64),
            col("ad_server_clicks", ColumnType::Int64),
            col("active_view_measurable_rate", ColumnType::Float64),
            col("active_view_viewable_impressions", ColumnType::Int64),
        ],
        table: "report_geo_monthly",
        partition: Partitioning {
            field: "report_date",
            granularity: PartitionGranularity::Month,
        },
    }
}

fn audience_interest() -> ReportSpec {
    ReportSpec {
        report_type: ReportType::AudienceInterest,
        saved_report_id: None,
        dimensions: vec!["MONTH_AND_YEAR", "INTEREST"],
        metrics: vec!["AD_SERVER_IMPRESSIONS", "AD_SERVER_CLICKS"],
        rename: vec![
            ("MONTH_AND_YEAR", "report_date"),
            ("INTEREST", "interest_category"),
            ("AD_SERVER_IMPRESSIONS", "ad_server_impressions"),
            ("AD_SERVER_CLICKS", "ad_server_clicks"),
        ],
        conversions: vec![
            ("report_date", Convert::MonthYear),
            ("interest_category", Convert::Text),
            ("ad_server_impressions", Convert::Int64),
            ("ad_server_clicks", Convert::Int64),
        ],
        columns: vec![
            col("report_date", ColumnType::Date),
            col("interest_category", ColumnType::Text),
            col("ad_server_impressions", ColumnType::Int64),
            col("ad_server_clicks", ColumnType::Int64),
        ],
        table: "report_audience_interest",
        partition: Partitioning {
            field: "report_date",
            granularity: PartitionGranularity::Month,
        },
    }
}

fn audience_demographics() -> ReportSpec {
    ReportSpec {
        report_type: ReportType::AudienceDemographics,
        saved_report_id: None,
        dimensions: vec!["MONTH_AND_YEAR", "GENDER", "AGE_BRACKET"],
        metrics: vec!["AD_SERVER_IMPRESSIONS", "AD_SERVER_CLICKS"],
        rename: vec![
            ("MONTH_AND_YEAR", "report_date"),
            ("GENDER", "gender"),
            ("AGE_BRACKET", "age_bracket"),
            ("AD_SERVER_IMPRESSIONS", "ad_server_impressions"),
            ("AD_SERVER_CLICKS", "ad_server_clicks"),
        ],
        conversions: vec![
            ("report_date", Convert::MonthYear),
            ("gender", Convert::Text),
            ("age_bracket", Convert::Text),
            ("ad_server_impressions", Convert::Int64),
            ("ad_server_clicks", Convert::Int64),
        ],
        columns: vec![
            col("report_date", ColumnType::Date),
            col("gender", ColumnType::Text),
            col("age_bracket", ColumnType::Text),
            col("ad_server_impressions", ColumnType::Int64),
            col("ad_server_clicks", ColumnType::Int64),
        ],
        table: "report_audience_demographics",
        partition: Partitioning {
            field: "report_date",
            granularity: PartitionGranularity::Month,
        },
    }
}
