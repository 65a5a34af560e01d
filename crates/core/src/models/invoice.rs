use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 维修记录
///
/// 工作开始后由技师追加的只读工单条目。调度引擎从不创建它，
/// 只在开票时读取其费用字段。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    pub id: String,
    pub request_id: String,
    pub mechanic_id: String,
    pub time_spent_minutes: i32,
    pub parts_cost: f64,
    pub labor_cost: f64,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// 支付状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PAID")]
    Paid,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "REFUNDED")]
    Refunded,
}

/// 支付方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMethod {
    #[serde(rename = "CARD")]
    Card,
    #[serde(rename = "CASH")]
    Cash,
    #[serde(rename = "TRANSFER")]
    Transfer,
    #[serde(rename = "CHECK")]
    Check,
}

/// 发票
///
/// 每个请求最多一张（1:1），由生命周期进入 COMPLETED 时创建一次，
/// 初始为 PENDING 支付状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub request_id: String,
    pub parts_amount: f64,
    pub labor_amount: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub status: PaymentStatus,
    /// 支付前为空
    pub payment_method: Option<PaymentMethod>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// 根据请求的维修记录汇总开票
    pub fn from_interventions(
        request_id: &str,
        interventions: &[Intervention],
        tax_rate: f64,
    ) -> Self {
        let parts_amount: f64 = interventions.iter().map(|i| i.parts_cost).sum();
        let labor_amount: f64 = interventions.iter().map(|i| i.labor_cost).sum();
        let tax_amount = (parts_amount + labor_amount) * tax_rate;

        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            parts_amount,
            labor_amount,
            tax_amount,
            total_amount: parts_amount + labor_amount + tax_amount,
            status: PaymentStatus::Pending,
            payment_method: None,
            paid_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intervention(parts: f64, labor: f64) -> Intervention {
        Intervention {
            id: Uuid::new_v4().to_string(),
            request_id: "r-1".to_string(),
            mechanic_id: "m-1".to_string(),
            time_spent_minutes: 45,
            parts_cost: parts,
            labor_cost: labor,
            notes: "更换轮胎".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_invoice_totals_interventions() {
        let items = vec![intervention(80.0, 40.0), intervention(20.0, 60.0)];
        let invoice = Invoice::from_interventions("r-1", &items, 0.2);

        assert_eq!(invoice.parts_amount, 100.0);
        assert_eq!(invoice.labor_amount, 100.0);
        assert!((invoice.tax_amount - 40.0).abs() < 1e-9);
        assert!((invoice.total_amount - 240.0).abs() < 1e-9);
        assert_eq!(invoice.status, PaymentStatus::Pending);
        assert!(invoice.payment_method.is_none());
    }

    #[test]
    fn test_invoice_empty_interventions() {
        let invoice = Invoice::from_interventions("r-1", &[], 0.2);
        assert_eq!(invoice.total_amount, 0.0);
        assert_eq!(invoice.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_invoice_serde_schema_names() {
        let invoice = Invoice::from_interventions("r-1", &[intervention(10.0, 5.0)], 0.0);
        let json = serde_json::to_value(&invoice).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["requestId"], "r-1");
        assert!(json.get("totalAmount").is_some());
        assert!(json["paymentMethod"].is_null());
    }
}
