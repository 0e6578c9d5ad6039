//! Built-in categories and sample notes

use chrono::{DateTime, Utc};

use super::category::{NoteCategory, OTHER_CATEGORY};
use super::note::Note;
use super::record::{RecordId, Timestamp};

/// Categories shipped with a fresh installation.
#[must_use]
pub fn default_categories() -> Vec<NoteCategory> {
    [
        ("1", "命令行工具", "常用命令行命令和工具"),
        ("2", "软件教程", "各种软件的使用教程"),
        ("3", "开发技巧", "编程和开发相关技巧"),
        ("4", OTHER_CATEGORY, "其他类型的笔记"),
    ]
    .into_iter()
    .map(|(id, name, description)| NoteCategory {
        id: RecordId::from(id),
        name: name.to_string(),
        description: Some(description.to_string()),
        updated_at: None,
    })
    .collect()
}

/// Timestamp carried by every sample note. Every device installs the same
/// copies, so any real edit or delete is newer and wins the merge.
pub const SEED_TIMESTAMP: Timestamp = DateTime::<Utc>::UNIX_EPOCH;

/// Sample notes shown until the user writes their own.
#[must_use]
pub fn sample_notes() -> Vec<Note> {
    let timestamp = SEED_TIMESTAMP;
    let sample = |id: &str, title: &str, content: &str, category: &str, tags: &[&str]| Note {
        id: RecordId::from(id),
        title: title.to_string(),
        content: content.to_string(),
        category: category.to_string(),
        tags: tags.iter().map(|tag| (*tag).to_string()).collect(),
        created_at: timestamp,
        updated_at: timestamp,
        deleted: false,
        deleted_at: None,
    };

    vec![
        sample(
            "0",
            "NoteMemo 项目介绍",
            "# NoteMemo - 极简笔记备忘录\n\n\
             NoteMemo 是一款极简笔记应用，支持快速搜索和分类管理。\n\n\
             ## 主要特点\n\n\
             - **Markdown支持** - 所有笔记均支持Markdown格式\n\
             - **快速搜索** - 支持标题、内容、分类和标签搜索\n\
             - **分类管理** - 自定义分类，轻松整理笔记\n\
             - **离线优先** - 数据保存在本地，联网时多设备同步\n",
            OTHER_CATEGORY,
            &["noteMemo", "project"],
        ),
        sample(
            "1",
            "笔记管理与分类方法",
            "# NoteMemo 笔记管理指南\n\n\
             ## 删除分类\n\n\
             删除分类后，该分类下的笔记会被移动到\"其他\"分类。\n\n\
             ## 搜索技巧\n\n\
             - 搜索支持标题、内容、分类和标签\n",
            "软件教程",
            &["noteMemo", "tutorial", "notes-management"],
        ),
        sample(
            "2",
            "Markdown 常见写法",
            "# Markdown 语法指南\n\n\
             ## 强调\n\n\
             ```\n*斜体* 或 _斜体_\n**粗体** 或 __粗体__\n```\n\n\
             ## 任务列表\n\n\
             ```\n- [x] 已完成任务\n- [ ] 未完成任务\n```\n",
            "软件教程",
            &["markdown", "tutorial", "formatting"],
        ),
        sample(
            "3",
            "Git 常用命令",
            "# Git 基本命令\n\n\
             ## 初始化\n```bash\ngit init\ngit clone <repository>\n```\n\n\
             ## 基本操作\n```bash\ngit add .\ngit commit -m \"message\"\ngit push origin main\n```\n",
            "命令行工具",
            &["git", "version-control"],
        ),
    ]
}
