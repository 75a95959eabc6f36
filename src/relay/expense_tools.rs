//! 团队费用工具
//!
//! Code Execution 演示中模型可调用的三个本地工具，数据为进程内确定性生成的样例集。

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const PTC_CALLER: &str = "code_execution_20250825";

#[derive(Debug, Clone, Serialize)]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    pub role: String,
    pub level: String,
    pub department: String,
    pub email: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Expense {
    pub expense_id: String,
    pub date: String,
    pub category: String,
    pub description: String,
    pub amount: f64,
    pub status: String,
    pub merchant: String,
    pub payment_method: String,
    pub project_codes: Vec<String>,
}

/// (部门, 编号前缀, 成员 [(姓名, 职位, 级别, 城市)])
type DepartmentRoster = (
    &'static str,
    &'static str,
    &'static [(&'static str, &'static str, &'static str, &'static str)],
);

const ROSTERS: &[DepartmentRoster] = &[
    (
        "engineering",
        "ENG",
        &[
            ("Alice Chen", "Engineering Manager", "principal", "Seattle"),
            ("Bob Martinez", "Backend Engineer", "senior", "Austin"),
            ("Carol Okafor", "Frontend Engineer", "mid", "New York"),
            ("David Kim", "Site Reliability Engineer", "staff", "Seattle"),
            ("Eva Novak", "Data Engineer", "senior", "Chicago"),
            ("Frank Li", "Mobile Engineer", "junior", "San Francisco"),
            ("Grace Patel", "Security Engineer", "staff", "Boston"),
            ("Henry Walsh", "Platform Engineer", "mid", "Denver"),
        ],
    ),
    (
        "sales",
        "SAL",
        &[
            ("Irene Costa", "Account Executive", "senior", "Miami"),
            ("Jack Turner", "Sales Development Rep", "junior", "Atlanta"),
            ("Karen Lopez", "Regional Sales Director", "principal", "Dallas"),
            ("Leo Schmidt", "Solutions Engineer", "mid", "Chicago"),
            ("Maya Singh", "Account Manager", "mid", "Phoenix"),
        ],
    ),
    (
        "marketing",
        "MKT",
        &[
            ("Nina Rossi", "Marketing Director", "principal", "New York"),
            ("Omar Haddad", "Content Strategist", "mid", "Portland"),
            ("Paula Reyes", "Product Marketing Manager", "senior", "Austin"),
            ("Quinn Baker", "Events Coordinator", "junior", "Las Vegas"),
        ],
    ),
];

/// 自定义差旅预算例外
const CUSTOM_BUDGETS: &[(&str, f64, &str)] = &[
    ("ENG002", 8000.0, "Approved for quarterly customer onsite visits"),
    ("ENG004", 12000.0, "On-call coverage across regional datacenters"),
    ("ENG007", 7500.0, "Security conference speaker program"),
    ("SAL003", 15000.0, "Regional director covering multiple territories"),
];

const STANDARD_TRAVEL_BUDGET: f64 = 5000.0;

static MEMBERS: Lazy<Vec<TeamMember>> = Lazy::new(|| {
    ROSTERS
        .iter()
        .flat_map(|(department, prefix, people)| {
            people
                .iter()
                .enumerate()
                .map(move |(i, (name, role, level, location))| TeamMember {
                    id: format!("{}{:03}", prefix, i + 1),
                    name: name.to_string(),
                    role: role.to_string(),
                    level: level.to_string(),
                    department: department.to_string(),
                    email: format!(
                        "{}@example.com",
                        name.to_lowercase().replace(' ', ".")
                    ),
                    location: location.to_string(),
                })
        })
        .collect()
});

/// 同一员工同一季度使用固定种子，保证数据恒定
fn seeded_rng(key: &str) -> StdRng {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    StdRng::seed_from_u64(hasher.finish())
}

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn quarter_months(quarter: &str) -> Option<[u32; 3]> {
    match quarter.trim().to_uppercase().as_str() {
        "Q1" => Some([1, 2, 3]),
        "Q2" => Some([4, 5, 6]),
        "Q3" => Some([7, 8, 9]),
        "Q4" => Some([10, 11, 12]),
        _ => None,
    }
}

pub fn get_team_members(department: &str) -> Result<Vec<TeamMember>, String> {
    let department = department.trim().to_lowercase();
    let members: Vec<TeamMember> = MEMBERS
        .iter()
        .filter(|m| m.department == department)
        .cloned()
        .collect();
    if members.is_empty() {
        return Err(format!(
            "Unknown department: {department}. Available departments are: engineering, sales, and marketing."
        ));
    }
    Ok(members)
}

pub fn get_expenses(employee_id: &str, quarter: &str) -> Result<Vec<Expense>, String> {
    let employee_id = employee_id.trim().to_uppercase();
    if !MEMBERS.iter().any(|m| m.id == employee_id) {
        return Err(format!("Unknown employee: {employee_id}"));
    }
    let months =
        quarter_months(quarter).ok_or_else(|| format!("Invalid quarter: {quarter}"))?;

    const CATEGORIES: &[(&str, &[&str], &[&str], (u64, u64))] = &[
        (
            "travel",
            &["Flight to client site", "Hotel stay", "Conference travel", "Train tickets", "Airport transfer"],
            &["Delta Air Lines", "Marriott", "United Airlines", "Hilton", "Amtrak"],
            (180, 1400),
        ),
        (
            "meals",
            &["Team lunch", "Client dinner", "Working breakfast"],
            &["Blue Bottle Cafe", "The Capital Grille", "Sweetgreen"],
            (25, 240),
        ),
        (
            "software",
            &["IDE license", "Cloud credits", "Design tool seat"],
            &["JetBrains", "AWS", "Figma"],
            (20, 600),
        ),
        (
            "equipment",
            &["External monitor", "Keyboard", "Headset"],
            &["Dell", "Logitech", "Jabra"],
            (40, 700),
        ),
        (
            "training",
            &["Online course", "Certification exam", "Workshop ticket"],
            &["Coursera", "Pearson VUE", "O'Reilly"],
            (50, 900),
        ),
    ];
    const STATUSES: &[&str] = &[
        "approved", "approved", "approved", "approved", "approved", "approved", "pending",
        "rejected",
    ];
    const PAYMENT_METHODS: &[&str] = &["corporate_card", "corporate_card", "reimbursement"];
    const PROJECTS: &[&str] = &["PRJ-ATLAS", "PRJ-HELIX", "PRJ-NOVA", "OPS-GENERAL"];

    let quarter = quarter.trim().to_uppercase();
    let mut rng = seeded_rng(&format!("{employee_id}:{quarter}"));
    // 部分员工差旅明显偏多
    let travel_weight: u32 = rng.gen_range(1..=3);
    let count: usize = rng.gen_range(18..=32);

    let expenses = (0..count)
        .map(|i| {
            let category_index = if rng.gen_range(0..10) < 3 + travel_weight * 2 {
                0
            } else {
                rng.gen_range(1..CATEGORIES.len())
            };
            let (category, descriptions, merchants, (low, high)) = CATEGORIES[category_index];
            let cents: u64 = rng.gen_range(low * 100..high * 100);
            let month = months[rng.gen_range(0..months.len())];
            let day: u32 = rng.gen_range(1..=28);
            Expense {
                expense_id: format!("EXP-{}-{}-{:03}", employee_id, quarter, i + 1),
                date: format!("2025-{month:02}-{day:02}"),
                category: category.to_string(),
                description: pick(&mut rng, descriptions).to_string(),
                amount: cents as f64 / 100.0,
                status: pick(&mut rng, STATUSES).to_string(),
                merchant: pick(&mut rng, merchants).to_string(),
                payment_method: pick(&mut rng, PAYMENT_METHODS).to_string(),
                project_codes: vec![pick(&mut rng, PROJECTS).to_string()],
            }
        })
        .collect();
    Ok(expenses)
}

pub fn get_custom_budget(user_id: &str) -> Value {
    let user_id = user_id.trim().to_uppercase();
    match CUSTOM_BUDGETS.iter().find(|(id, _, _)| *id == user_id) {
        Some((_, budget, reason)) => json!({
            "user_id": user_id,
            "has_custom_budget": true,
            "travel_budget": budget,
            "reason": reason,
        }),
        None => json!({
            "user_id": user_id,
            "has_custom_budget": false,
            "travel_budget": STANDARD_TRAVEL_BUDGET,
            "reason": Value::Null,
        }),
    }
}

/// 工具声明（不含调用方限制）
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "get_team_members",
            "description": "Returns a list of team members for a given department. Each team member includes their ID, name, role, level (junior, mid, senior, staff, principal), and contact information. Available departments are: engineering, sales, and marketing.\n\nRETURN FORMAT: Returns a JSON string containing an ARRAY of team member objects. Parse with json.loads() to get a list.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "department": {
                        "type": "string",
                        "description": "The department name. Case-insensitive."
                    }
                },
                "required": ["department"]
            }
        }),
        json!({
            "name": "get_expenses",
            "description": "Returns all expense line items for a given employee in a specific quarter. Each expense includes date, category, description, amount (in USD), status (approved, pending, rejected), merchant name, payment method, and project codes. IMPORTANT: Only expenses with status='approved' should be counted toward budget limits.\n\nRETURN FORMAT: Returns a JSON string containing an ARRAY of expense objects.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "employee_id": {
                        "type": "string",
                        "description": "The unique employee identifier"
                    },
                    "quarter": {
                        "type": "string",
                        "description": "Quarter identifier: 'Q1', 'Q2', 'Q3', or 'Q4'"
                    }
                },
                "required": ["employee_id", "quarter"]
            }
        }),
        json!({
            "name": "get_custom_budget",
            "description": "Get the custom quarterly travel budget for a specific employee. Most employees have a standard $5,000 quarterly travel budget. However, some employees have custom budget exceptions.\n\nRETURN FORMAT: Returns a JSON string containing a SINGLE OBJECT with has_custom_budget, travel_budget, reason fields.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "user_id": {
                        "type": "string",
                        "description": "The unique employee identifier"
                    }
                },
                "required": ["user_id"]
            }
        }),
    ]
}

/// 允许代码容器调用的工具集，末尾附加 code_execution 工具
pub fn ptc_tools() -> Vec<Value> {
    let mut tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|mut tool| {
            tool["allowed_callers"] = json!([PTC_CALLER]);
            tool
        })
        .collect();
    tools.push(json!({
        "type": PTC_CALLER,
        "name": "code_execution",
    }));
    tools
}

fn str_arg<'a>(input: &'a Value, name: &str) -> Result<&'a str, String> {
    input
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing required argument: {name}"))
}

/// 执行工具调用，返回序列化后的结果文本
pub fn execute_tool(name: &str, input: &Value) -> Result<String, String> {
    let result = match name {
        "get_team_members" => {
            serde_json::to_value(get_team_members(str_arg(input, "department")?)?)
        }
        "get_expenses" => serde_json::to_value(get_expenses(
            str_arg(input, "employee_id")?,
            str_arg(input, "quarter")?,
        )?),
        "get_custom_budget" => Ok(get_custom_budget(str_arg(input, "user_id")?)),
        other => return Err(format!("Unknown tool: {other}")),
    };
    result
        .map(|v| v.to_string())
        .map_err(|e| format!("Failed to serialize tool result: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_members_case_insensitive() {
        let members = get_team_members("Engineering").unwrap();
        assert_eq!(members.len(), 8);
        assert_eq!(members[0].id, "ENG001");
        assert!(get_team_members("legal").is_err());
    }

    #[test]
    fn test_expenses_are_deterministic() {
        let a = get_expenses("ENG002", "Q3").unwrap();
        let b = get_expenses("eng002", "q3").unwrap();
        assert_eq!(a.len(), b.len());
        assert!((18..=32).contains(&a.len()));
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        assert!(a.iter().all(|e| e.date.starts_with("2025-0")));
        assert!(a.iter().all(|e| ["07", "08", "09"].contains(&&e.date[5..7])));
    }

    #[test]
    fn test_expense_amounts_within_category_range() {
        for id in ["ENG001", "SAL003", "MKT004"] {
            for e in get_expenses(id, "Q1").unwrap() {
                assert!(e.amount >= 20.0 && e.amount < 1400.0, "{e:?}");
                assert!(!e.merchant.is_empty() && !e.status.is_empty());
            }
        }
        let other_quarter = get_expenses("ENG001", "Q2").unwrap();
        assert!(other_quarter.iter().all(|e| ["04", "05", "06"].contains(&&e.date[5..7])));
    }

    #[test]
    fn test_expenses_reject_bad_input() {
        assert!(get_expenses("ENG999", "Q3").is_err());
        assert!(get_expenses("ENG001", "Q5").is_err());
    }

    #[test]
    fn test_custom_budget() {
        let custom = get_custom_budget("ENG004");
        assert_eq!(custom["has_custom_budget"], true);
        assert_eq!(custom["travel_budget"], 12000.0);

        let standard = get_custom_budget("ENG001");
        assert_eq!(standard["has_custom_budget"], false);
        assert_eq!(standard["travel_budget"], 5000.0);
        assert!(standard["reason"].is_null());
    }

    #[test]
    fn test_ptc_tools_allow_code_execution_caller() {
        let tools = ptc_tools();
        assert_eq!(tools.len(), 4);
        for tool in &tools[..3] {
            assert_eq!(tool["allowed_callers"], json!([PTC_CALLER]));
        }
        assert_eq!(tools[3]["type"], PTC_CALLER);
    }

    #[test]
    fn test_execute_tool() {
        let out = execute_tool("get_custom_budget", &json!({"user_id": "SAL003"})).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["travel_budget"], 15000.0);

        assert!(execute_tool("get_expenses", &json!({"employee_id": "ENG001"})).is_err());
        assert!(execute_tool("drop_tables", &json!({})).is_err());
    }
}
