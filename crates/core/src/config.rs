use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{DispatchError, DispatchResult};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub dispatcher: DispatcherConfig,
    pub ranking: RankingConfig,
    pub retry: RetryConfig,
    pub billing: BillingConfig,
}

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// 并行调度worker数量
    pub worker_count: usize,
    /// 每次匹配从地理索引取的候选数量上限
    pub candidate_limit: usize,
    /// ASSIGNED 状态等待技师确认的超时窗口（秒）
    pub confirm_timeout_seconds: u64,
    /// 超时扫描间隔（秒）
    pub timeout_scan_interval_seconds: u64,
    /// 单个请求的最大调度尝试次数，超过后对外报告"当前无可用技师"
    pub max_dispatch_attempts: i32,
    /// 请求指定了服务站时是否严格限定在该站内匹配
    pub respect_station_pin: bool,
    /// 初始优先级中 urgency 的放大系数
    pub urgency_priority_weight: i32,
}

/// 匹配打分权重配置
///
/// 原始系统没有留下实际使用的权重，这里的默认值是本实现的设计选择，
/// 全部可配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// 每公里距离的基础代价
    pub distance_weight: f64,
    /// 专长精确匹配的加成（以公里当量表示）
    pub specialty_boost_km: f64,
    /// urgency 对距离权重的锐化系数
    pub urgency_weight: f64,
}

/// 重新排队退避配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 基础退避间隔（秒）
    pub base_interval_seconds: u64,
    /// 最大退避间隔（秒）
    pub max_interval_seconds: u64,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 退避间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
}

/// 开票配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// 税率
    pub tax_rate: f64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            candidate_limit: 8,
            confirm_timeout_seconds: 300,
            timeout_scan_interval_seconds: 30,
            max_dispatch_attempts: 5,
            respect_station_pin: false,
            urgency_priority_weight: 10,
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            distance_weight: 1.0,
            specialty_boost_km: 5.0,
            urgency_weight: 0.15,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_interval_seconds: 30,
            max_interval_seconds: 600,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self { tax_rate: 0.20 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            ranking: RankingConfig::default(),
            retry: RetryConfig::default(),
            billing: BillingConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// 优先级：显式路径 > 默认路径 > 内置默认值；环境变量
    /// （ROADSIDE_ 前缀）始终可以覆盖文件值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/roadside.toml",
                "roadside.toml",
                "/etc/roadside/config.toml",
            ];

            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder
            .set_default("dispatcher.worker_count", 4)?
            .set_default("dispatcher.candidate_limit", 8)?
            .set_default("dispatcher.confirm_timeout_seconds", 300)?
            .set_default("dispatcher.timeout_scan_interval_seconds", 30)?
            .set_default("dispatcher.max_dispatch_attempts", 5)?
            .set_default("dispatcher.respect_station_pin", false)?
            .set_default("dispatcher.urgency_priority_weight", 10)?
            .set_default("ranking.distance_weight", 1.0)?
            .set_default("ranking.specialty_boost_km", 5.0)?
            .set_default("ranking.urgency_weight", 0.15)?
            .set_default("retry.base_interval_seconds", 30)?
            .set_default("retry.max_interval_seconds", 600)?
            .set_default("retry.backoff_multiplier", 2.0)?
            .set_default("retry.jitter_factor", 0.1)?
            .set_default("billing.tax_rate", 0.20)?;

        builder = builder.add_source(
            Environment::with_prefix("ROADSIDE")
                .separator("_")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate().context("配置校验失败")?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate().context("配置校验失败")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> DispatchResult<()> {
        self.dispatcher.validate()?;
        self.ranking.validate()?;
        self.retry.validate()?;
        self.billing.validate()?;
        Ok(())
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.worker_count == 0 {
            return Err(DispatchError::Configuration(
                "dispatcher.worker_count 不能为0".to_string(),
            ));
        }
        if self.candidate_limit == 0 {
            return Err(DispatchError::Configuration(
                "dispatcher.candidate_limit 不能为0".to_string(),
            ));
        }
        if self.confirm_timeout_seconds == 0 {
            return Err(DispatchError::Configuration(
                "dispatcher.confirm_timeout_seconds 不能为0".to_string(),
            ));
        }
        if self.timeout_scan_interval_seconds == 0 {
            return Err(DispatchError::Configuration(
                "dispatcher.timeout_scan_interval_seconds 不能为0".to_string(),
            ));
        }
        if self.max_dispatch_attempts <= 0 {
            return Err(DispatchError::Configuration(
                "dispatcher.max_dispatch_attempts 必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}

impl RankingConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.distance_weight <= 0.0 {
            return Err(DispatchError::Configuration(
                "ranking.distance_weight 必须大于0".to_string(),
            ));
        }
        if self.specialty_boost_km < 0.0 {
            return Err(DispatchError::Configuration(
                "ranking.specialty_boost_km 不能为负".to_string(),
            ));
        }
        if self.urgency_weight < 0.0 {
            return Err(DispatchError::Configuration(
                "ranking.urgency_weight 不能为负".to_string(),
            ));
        }
        Ok(())
    }
}

impl RetryConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.base_interval_seconds == 0 {
            return Err(DispatchError::Configuration(
                "retry.base_interval_seconds 不能为0".to_string(),
            ));
        }
        if self.max_interval_seconds < self.base_interval_seconds {
            return Err(DispatchError::Configuration(
                "retry.max_interval_seconds 不能小于基础间隔".to_string(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(DispatchError::Configuration(
                "retry.backoff_multiplier 不能小于1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(DispatchError::Configuration(
                "retry.jitter_factor 必须在0.0-1.0之间".to_string(),
            ));
        }
        Ok(())
    }
}

impl BillingConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if !(0.0..1.0).contains(&self.tax_rate) {
            return Err(DispatchError::Configuration(
                "billing.tax_rate 必须在0.0-1.0之间".to_string(),
            ));
        }
        Ok(())
    }
}
