//! The `examlens init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("examlens.toml").exists() {
        println!("examlens.toml already exists, skipping.");
    } else {
        std::fs::write("examlens.toml", SAMPLE_CONFIG)?;
        println!("Created examlens.toml");
    }

    std::fs::create_dir_all("sheets")?;
    let sample_path = Path::new("sheets/sample.md");
    if sample_path.exists() {
        println!("sheets/sample.md already exists, skipping.");
    } else {
        std::fs::write(sample_path, SAMPLE_SHEET)?;
        println!("Created sheets/sample.md");
    }

    println!("\nNext steps:");
    println!("  1. Set EXAMLENS_API_KEY or edit examlens.toml");
    println!("  2. Run: examlens segment --sheet sheets/sample.md");
    println!("  3. Run: examlens analyze --sheet sheets/sample.md --format all");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examlens configuration

default_provider = "deepseek"
default_model = "deepseek-chat"
temperature = 0.0
max_tokens = 4096
max_attempts = 3
attempt_timeout_secs = 120
max_fix_attempts = 3
refine_mastery = true
parallelism = 4
output_dir = "./examlens-reports"

[providers.deepseek]
type = "openai"
api_key = "${DEEPSEEK_API_KEY}"
base_url = "https://api.deepseek.com/v1"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"
"#;

const SAMPLE_SHEET: &str = "\
# 期末考试答题卡

## 一、单选题（共4分）
得分：2

### 第1题
Python 中用于定义函数的关键字是？（2分）
**学生答案**：A
**正确答案**：A
得分：2

### 第2题
列表的长度用哪个函数获取？（2分）
**学生答案**：B
**正确答案**：C
得分：0

## 二、简答题（共10分）
得分：7

### 第1题
简述列表与元组的区别。（10分）
**学生答案**：
列表可变，元组不可变。
**正确答案**：
列表是可变序列，元组是不可变序列，元组可作为字典键。
得分：7

## 考试总结
本次考试整体表现良好。
";
