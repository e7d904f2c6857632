use serde::Serialize;

/*
 * Sample figures behind the dashboard, stocks, expenses and news pages.
 * Nothing here is live market data.
 */

/** \brief Direction of a stat card's change. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatCard {
    pub title: &'static str,
    pub value: &'static str,
    pub description: &'static str,
    pub trend: Trend,
    pub trend_value: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stock {
    pub symbol: &'static str,
    pub name: &'static str,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub favorite: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sector {
    pub name: &'static str,
    pub change: f64,
}

impl Sector {
    pub fn trend(&self) -> Trend {
        if self.change >= 0.0 {
            Trend::Up
        } else {
            Trend::Down
        }
    }
}

/**
 * \brief One slice of the monthly expense pie.
 */
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseSlice {
    pub name: &'static str,
    pub value: f64,
    pub color: &'static str,
}

/**
 * \brief Spending against budget for one category.
 */
#[derive(Debug, Clone, Serialize)]
pub struct BudgetCategory {
    pub name: &'static str,
    pub amount: f64,
    pub budget: f64,
}

impl BudgetCategory {
    pub fn is_over_budget(&self) -> bool {
        self.amount > self.budget
    }

    /** \brief Budget left; negative when overspent. */
    pub fn remaining(&self) -> f64 {
        self.budget - self.amount
    }

    /** \brief Share of the budget used, in percent. */
    pub fn used_percent(&self) -> f64 {
        if self.budget <= 0.0 {
            return 0.0;
        }
        self.amount / self.budget * 100.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FinancialTip {
    pub title: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsItem {
    pub title: &'static str,
    pub summary: &'static str,
    pub source: &'static str,
    pub time: &'static str,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketIndex {
    pub index: &'static str,
    pub value: &'static str,
    pub change: &'static str,
    pub percent: &'static str,
}

/**
 * \brief Share of the total for one expense slice.
 */
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseShare {
    pub name: &'static str,
    pub value: f64,
    pub percent: f64,
}

pub fn stat_cards() -> Vec<StatCard> {
    vec![
        StatCard {
            title: "Portfolio Value",
            value: "$24,589.75",
            description: "Your total investments",
            trend: Trend::Up,
            trend_value: "+$420.65 (1.73%)",
        },
        StatCard {
            title: "Monthly Income",
            value: "$8,500.00",
            description: "April 2025",
            trend: Trend::Up,
            trend_value: "+5% from last month",
        },
        StatCard {
            title: "Monthly Expenses",
            value: "$2,845.50",
            description: "18 transactions",
            trend: Trend::Down,
            trend_value: "-$124.30 (-4.2%)",
        },
        StatCard {
            title: "Market Trends",
            value: "S&P 500: 5,235.48",
            description: "Market closed",
            trend: Trend::Up,
            trend_value: "+0.89% today",
        },
    ]
}

pub fn watchlist() -> Vec<Stock> {
    let stock = |symbol, name, price, change, change_percent, favorite| Stock {
        symbol,
        name,
        price,
        change,
        change_percent,
        favorite,
    };
    vec![
        stock("AAPL", "Apple Inc.", 178.72, 2.14, 1.21, true),
        stock("MSFT", "Microsoft", 416.38, 5.73, 1.39, true),
        stock("AMZN", "Amazon", 178.92, -0.76, -0.42, false),
        stock("GOOGL", "Alphabet", 163.49, 0.58, 0.36, false),
        stock("TSLA", "Tesla", 176.75, -4.28, -2.36, true),
    ]
}

pub fn sectors() -> Vec<Sector> {
    [
        ("Technology", 1.25),
        ("Healthcare", 0.75),
        ("Financials", -0.5),
        ("Energy", -1.2),
        ("Consumer Staples", 0.32),
        ("Industrials", 0.14),
    ]
    .into_iter()
    .map(|(name, change)| Sector { name, change })
    .collect()
}

/**
 * \brief Split the watchlist into gainers and losers, each ordered by size of move.
 */
pub fn movers(stocks: &[Stock]) -> (Vec<&Stock>, Vec<&Stock>) {
    let (mut gainers, mut losers): (Vec<&Stock>, Vec<&Stock>) =
        stocks.iter().partition(|s| s.change_percent >= 0.0);
    gainers.sort_by(|a, b| b.change_percent.total_cmp(&a.change_percent));
    losers.sort_by(|a, b| a.change_percent.total_cmp(&b.change_percent));
    (gainers, losers)
}

pub fn expense_breakdown() -> Vec<ExpenseSlice> {
    [
        ("Housing", 1200.0, "#0F4C81"),
        ("Food", 450.0, "#00A5A5"),
        ("Transportation", 300.0, "#FFA63F"),
        ("Entertainment", 200.0, "#FF6B6B"),
        ("Utilities", 180.0, "#8B5CF6"),
        ("Other", 270.0, "#64748B"),
    ]
    .into_iter()
    .map(|(name, value, color)| ExpenseSlice { name, value, color })
    .collect()
}

pub fn expense_total(slices: &[ExpenseSlice]) -> f64 {
    slices.iter().map(|s| s.value).sum()
}

pub fn expense_shares(slices: &[ExpenseSlice]) -> Vec<ExpenseShare> {
    let total = expense_total(slices);
    slices
        .iter()
        .map(|s| ExpenseShare {
            name: s.name,
            value: s.value,
            percent: if total > 0.0 { s.value / total * 100.0 } else { 0.0 },
        })
        .collect()
}

pub fn budget_categories() -> Vec<BudgetCategory> {
    [
        ("Housing", 1500.0, 1800.0),
        ("Food", 420.0, 500.0),
        ("Transportation", 280.0, 300.0),
        ("Entertainment", 150.0, 200.0),
        ("Shopping", 310.0, 250.0),
        ("Utilities", 180.0, 250.0),
    ]
    .into_iter()
    .map(|(name, amount, budget)| BudgetCategory { name, amount, budget })
    .collect()
}

pub fn financial_tips() -> Vec<FinancialTip> {
    vec![
        FinancialTip {
            title: "50/30/20 Rule",
            description: "Allocate 50% of your income to needs, 30% to wants, and 20% to savings/debt.",
        },
        FinancialTip {
            title: "Emergency Fund",
            description: "Build an emergency fund that covers 3-6 months of expenses.",
        },
        FinancialTip {
            title: "Debt Management",
            description: "Pay high-interest debts first while making minimum payments on others.",
        },
    ]
}

pub fn news() -> Vec<NewsItem> {
    vec![
        NewsItem {
            title: "Federal Reserve Signals Potential Rate Cuts Later This Year",
            summary: "The Fed Chairman indicated in a recent speech that inflation is cooling, opening the door for future rate cuts.",
            source: "Financial Times",
            time: "2 hours ago",
            sentiment: Sentiment::Positive,
        },
        NewsItem {
            title: "Tech Stocks Slide as Earnings Reports Disappoint Investors",
            summary: "Major tech companies released Q2 earnings below analyst expectations, triggering a sell-off in the sector.",
            source: "Bloomberg",
            time: "5 hours ago",
            sentiment: Sentiment::Negative,
        },
        NewsItem {
            title: "Oil Prices Stabilize Amid Middle East Tensions",
            summary: "Crude oil prices have remained steady despite ongoing geopolitical concerns in major producing regions.",
            source: "Reuters",
            time: "10 hours ago",
            sentiment: Sentiment::Neutral,
        },
        NewsItem {
            title: "New Startup Funding Rounds Show Venture Capital Is Back",
            summary: "Several fintech startups announced successful Series B funding rounds, suggesting VC confidence is returning.",
            source: "TechCrunch",
            time: "1 day ago",
            sentiment: Sentiment::Positive,
        },
    ]
}

pub fn news_with_sentiment(items: &[NewsItem], sentiment: Sentiment) -> Vec<&NewsItem> {
    items.iter().filter(|n| n.sentiment == sentiment).collect()
}

pub fn market_updates() -> Vec<MarketIndex> {
    [
        ("Sensex", "72,456.18", "+256.35", "+0.35%"),
        ("Nifty 50", "22,043.25", "+78.90", "+0.36%"),
        ("Dow Jones", "39,123.15", "+123.45", "+0.32%"),
        ("NASDAQ", "16,378.85", "-42.17", "-0.26%"),
        ("FTSE 100", "8,245.30", "+32.15", "+0.39%"),
    ]
    .into_iter()
    .map(|(index, value, change, percent)| MarketIndex {
        index,
        value,
        change,
        percent,
    })
    .collect()
}

/**
 * \brief Starter questions offered next to the chat.
 */
pub fn suggested_questions() -> Vec<&'static str> {
    vec![
        "How should I diversify my investment portfolio?",
        "What's the difference between mutual funds and ETFs?",
        "How much should I save for retirement?",
        "Can you explain the current market trends?",
        "How do I create an emergency fund?",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expense_total_and_shares() {
        let slices = expense_breakdown();
        assert_eq!(expense_total(&slices), 2600.0);
        let shares = expense_shares(&slices);
        let sum: f64 = shares.iter().map(|s| s.percent).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        let housing = shares.iter().find(|s| s.name == "Housing").expect("housing");
        assert!((housing.percent - 46.153_846).abs() < 1e-4);
    }

    #[test]
    fn test_expense_shares_of_nothing() {
        assert!(expense_shares(&[]).is_empty());
        let zero = [ExpenseSlice {
            name: "None",
            value: 0.0,
            color: "#000000",
        }];
        assert_eq!(expense_shares(&zero)[0].percent, 0.0);
    }

    #[test]
    fn test_only_shopping_is_over_budget() {
        let over: Vec<&str> = budget_categories()
            .iter()
            .filter(|c| c.is_over_budget())
            .map(|c| c.name)
            .collect();
        assert_eq!(over, vec!["Shopping"]);

        let shopping = budget_categories()
            .into_iter()
            .find(|c| c.name == "Shopping")
            .expect("shopping");
        assert_eq!(shopping.remaining(), -60.0);
        assert!(shopping.used_percent() > 100.0);
    }

    #[test]
    fn test_movers_are_sorted() {
        let stocks = watchlist();
        let (gainers, losers) = movers(&stocks);
        let up: Vec<&str> = gainers.iter().map(|s| s.symbol).collect();
        let down: Vec<&str> = losers.iter().map(|s| s.symbol).collect();
        assert_eq!(up, vec!["MSFT", "AAPL", "GOOGL"]);
        assert_eq!(down, vec!["TSLA", "AMZN"]);
    }

    #[test]
    fn test_news_filter_and_parse() {
        let items = news();
        assert_eq!(news_with_sentiment(&items, Sentiment::Positive).len(), 2);
        assert_eq!(news_with_sentiment(&items, Sentiment::Negative).len(), 1);
        assert_eq!(Sentiment::parse(" Neutral "), Some(Sentiment::Neutral));
        assert_eq!(Sentiment::parse("bullish"), None);
    }

    #[test]
    fn test_sector_trend() {
        let sectors = sectors();
        let down: Vec<&str> = sectors
            .iter()
            .filter(|s| s.trend() == Trend::Down)
            .map(|s| s.name)
            .collect();
        assert_eq!(down, vec!["Financials", "Energy"]);
    }
}
