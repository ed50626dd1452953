//! 无 UI 的命令行前端：每个子命令驱动一次状态层操作并打印结果。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand};
use tracing::{info, warn};

use novels_reader::base_system::context::Config;
use novels_reader::network::CatalogClient;
use novels_reader::network::models::{Chapter, ChapterDraft, NewTranslator, NovelDraft, Sort, SortOrder};
use novels_reader::session::{
    ChapterNeighbors, ListController, ListFilter, ListItem, ListSnapshot, Publisher,
    ReadingSessionTracker, ScrollMetrics, SearchBox, Tab, become_translator,
};
use novels_reader::storage::{
    FileHostStorage, KeyValueStore, ReadingSettings, Theme, UserPreferencesRepository,
};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 最新章节
    Latest {
        /// 只看已订阅的小说
        #[arg(long, default_value_t = false)]
        subscribed: bool,
        /// 按关键字过滤
        #[arg(long)]
        query: Option<String>,
        #[command(flatten)]
        pages: PagesArg,
    },
    /// 已订阅的小说
    Subscriptions {
        #[command(flatten)]
        pages: PagesArg,
    },
    /// 书签中的小说
    Bookmarks {
        #[command(flatten)]
        pages: PagesArg,
    },
    /// 搜索小说
    Search {
        query: String,
        #[command(flatten)]
        pages: PagesArg,
    },
    /// 某位译者的作品
    Translator {
        user_id: String,
        #[command(flatten)]
        pages: PagesArg,
    },
    Subscribe { novel_id: String },
    Unsubscribe { novel_id: String },
    Bookmark { novel_id: String },
    Unbookmark { novel_id: String },
    /// 阅读章节；未指定章节时从上次进度或第一章开始
    Read(ReadArgs),
    /// 最近阅读
    History,
    /// 查看或修改阅读设置
    Settings(SettingsArgs),
    /// 申请成为译者
    BecomeTranslator {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },
    /// 译者统计
    Stats { user_id: String },
    /// 译者后台：管理自己的小说
    #[command(subcommand)]
    Novel(NovelCommand),
    /// 清空本地全部偏好数据
    Reset,
}

#[derive(Debug, Subcommand)]
pub enum NovelCommand {
    /// 新建小说
    Create {
        #[command(flatten)]
        acting: ActingAs,
        #[command(flatten)]
        fields: NovelFields,
    },
    /// 修改自己的小说
    Edit {
        novel_id: String,
        #[command(flatten)]
        acting: ActingAs,
        #[command(flatten)]
        fields: NovelFields,
    },
    /// 删除自己的小说（不可恢复）
    Delete {
        novel_id: String,
        #[command(flatten)]
        acting: ActingAs,
        /// 确认删除
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// 发布新章节
    Publish {
        novel_id: String,
        #[command(flatten)]
        acting: ActingAs,
        #[arg(long)]
        number: u32,
        #[arg(long)]
        title: String,
        /// 正文文件路径
        #[arg(long)]
        content_file: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct ActingAs {
    /// 当前译者的用户 id
    #[arg(long = "as", value_name = "USER_ID")]
    user_id: String,
}

#[derive(Debug, Args)]
pub struct NovelFields {
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    cover_url: Option<String>,
    #[arg(long)]
    status: Option<String>,
    /// 可重复
    #[arg(long = "tag")]
    tags: Vec<String>,
}

impl NovelFields {
    fn into_draft(self) -> NovelDraft {
        NovelDraft {
            title: self.title,
            description: self.description,
            cover_url: self.cover_url,
            translator_id: String::new(),
            status: self.status,
            tags: self.tags,
        }
    }
}

#[derive(Debug, Args)]
pub struct PagesArg {
    /// 连续加载的页数
    #[arg(long, default_value_t = 1)]
    pages: u32,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    novel_id: String,
    #[arg(long)]
    chapter: Option<String>,
    /// 读完后跳到下一章
    #[arg(long, default_value_t = false, conflicts_with = "prev")]
    next: bool,
    /// 读完后跳到上一章
    #[arg(long, default_value_t = false)]
    prev: bool,
    /// 记录当前滚动位置（像素）
    #[arg(long)]
    position: Option<u32>,
}

#[derive(Debug, Args)]
pub struct SettingsArgs {
    #[arg(long)]
    font_size: Option<u8>,
    #[arg(long, default_value_t = false)]
    bigger: bool,
    #[arg(long, default_value_t = false)]
    smaller: bool,
    #[arg(long, default_value_t = false)]
    reset_font: bool,
    /// light / sepia / dark
    #[arg(long)]
    theme: Option<String>,
}

struct App {
    config: Config,
    client: Arc<CatalogClient>,
    prefs: Arc<UserPreferencesRepository>,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let host = Arc::new(FileHostStorage::new(config.storage_path()));
        let store = Arc::new(KeyValueStore::with_ttl(host, config.cache_ttl()));
        let prefs = Arc::new(UserPreferencesRepository::new(store));
        let client = Arc::new(CatalogClient::from_config(&config).context("invalid api_base_url")?);
        Ok(Self {
            config,
            client,
            prefs,
        })
    }

    fn list(&self, tab: Tab) -> Arc<ListController> {
        Arc::new(ListController::new(self.client.clone(), self.prefs.clone(), tab))
    }
}

pub async fn run(config: Config, command: Command) -> Result<()> {
    let app = App::new(config)?;
    match command {
        Command::Latest {
            subscribed,
            query,
            pages,
        } => {
            let ctrl = app.list(Tab::Latest);
            let filter = ListFilter {
                subscribed_only: subscribed,
            };
            ctrl.set_filter_and_query(filter, query.as_deref().unwrap_or_default())
                .await?;
            load_pages(&ctrl, pages.pages).await?;
            print_list(&ctrl.snapshot(), "暂无最新章节");
        }
        Command::Subscriptions { pages } => {
            let ctrl = app.list(Tab::Subscriptions);
            ctrl.reset().await?;
            load_pages(&ctrl, pages.pages).await?;
            print_list(&ctrl.snapshot(), "还没有订阅任何小说");
        }
        Command::Bookmarks { pages } => {
            let ctrl = app.list(Tab::Bookmarks);
            ctrl.reset().await?;
            load_pages(&ctrl, pages.pages).await?;
            print_list(&ctrl.snapshot(), "书签为空");
        }
        Command::Search { query, pages } => {
            let ctrl = app.list(Tab::Search);
            let (mut search, mut errors) = SearchBox::new(ctrl.clone(), app.config.search_debounce());
            search
                .input(&query)
                .await
                .map_err(|e| anyhow!("search task failed: {e}"))?;
            if let Ok(err) = errors.try_recv() {
                return Err(err.into());
            }
            load_pages(&ctrl, pages.pages).await?;
            print_list(&ctrl.snapshot(), "没有找到相关小说");
        }
        Command::Translator { user_id, pages } => {
            let ctrl = app.list(Tab::Translator(user_id));
            ctrl.reset().await?;
            load_pages(&ctrl, pages.pages).await?;
            print_list(&ctrl.snapshot(), "该译者还没有作品");
        }
        Command::Subscribe { novel_id } => {
            if app.prefs.add_subscription(&novel_id).await? {
                println!("已订阅 {novel_id}");
            } else {
                println!("{novel_id} 已在订阅列表中");
            }
        }
        Command::Unsubscribe { novel_id } => {
            app.prefs.remove_subscription(&novel_id).await?;
            println!("已取消订阅 {novel_id}");
        }
        Command::Bookmark { novel_id } => {
            if app.prefs.add_bookmark(&novel_id).await? {
                println!("已加入书签 {novel_id}");
            } else {
                println!("{novel_id} 已在书签中");
            }
        }
        Command::Unbookmark { novel_id } => {
            app.prefs.remove_bookmark(&novel_id).await?;
            println!("已移出书签 {novel_id}");
        }
        Command::Read(args) => read(&app, args).await?,
        Command::History => {
            let history = app.prefs.get_last_read().await?;
            if history.is_empty() {
                println!("暂无阅读记录");
            }
            for entry in history {
                println!(
                    "{}  小说 {}  章节 {}",
                    entry.timestamp, entry.novel_id, entry.chapter_id
                );
            }
        }
        Command::Settings(args) => settings(&app, args).await?,
        Command::BecomeTranslator {
            user_id,
            display_name,
            username,
            bio,
        } => {
            let data = NewTranslator {
                user_id,
                username,
                display_name,
                bio,
            };
            let translator = become_translator(&app.client, &app.prefs, &data).await?;
            println!("已成为译者：{} ({})", translator.display_name, translator.user_id);
        }
        Command::Stats { user_id } => {
            let stats = app.client.translator_stats(&user_id).await?;
            println!("作品数: {}", stats.novels_count);
            println!("章节数: {}", stats.chapters_count);
            println!("订阅数: {}", stats.subscribers_count);
            println!("阅读量: {}", stats.views);
        }
        Command::Novel(cmd) => novel(&app, cmd).await?,
        Command::Reset => {
            app.prefs.clear_all().await?;
            println!("本地数据已清空");
        }
    }
    Ok(())
}

async fn load_pages(ctrl: &ListController, pages: u32) -> Result<()> {
    if ctrl.page() == 1 {
        ctrl.load_next().await?;
    }
    for _ in 1..pages.max(1) {
        if !ctrl.has_more() {
            break;
        }
        ctrl.load_next().await?;
    }
    Ok(())
}

fn print_list(snap: &ListSnapshot, empty_hint: &str) {
    if snap.show_empty_placeholder || snap.items.is_empty() {
        println!("{empty_hint}");
        return;
    }
    for item in &snap.items {
        match item {
            ListItem::Novel(n) => {
                let translator = n.translator_name.as_deref().unwrap_or("-");
                println!("[{}] {}  译者: {}  订阅: {}", n.id, n.title, translator, n.subscribers);
            }
            ListItem::Feed(c) => {
                let novel = c.novel_title.as_deref().unwrap_or(&c.novel_id);
                println!("[{}] {} 第{}章 {}", c.id, novel, c.chapter_number, c.title);
            }
            ListItem::Chapter(c) => println!("[{}] 第{}章 {}", c.id, c.chapter_number, c.title),
        }
    }
    if snap.has_more {
        println!("... 还有更多（第 {} 页起），使用 --pages 加载", snap.page);
    }
}

/// 按章节号升序翻完整个目录。
async fn chapter_index(app: &App, novel_id: &str) -> Result<Vec<Chapter>> {
    let ctrl = app.list(Tab::Chapters(novel_id.to_string()));
    ctrl.set_sort(Sort {
        order: SortOrder::Asc,
        ..Sort::default()
    })
    .await?;
    while ctrl.has_more() {
        ctrl.load_next().await?;
    }
    let chapters = ctrl
        .snapshot()
        .items
        .into_iter()
        .filter_map(|item| match item {
            ListItem::Chapter(c) => Some(c),
            _ => None,
        })
        .collect();
    Ok(chapters)
}

async fn read(app: &App, args: ReadArgs) -> Result<()> {
    let chapters = chapter_index(app, &args.novel_id).await?;

    let chapter_id = match args.chapter {
        Some(id) => id,
        None => {
            let saved = app.prefs.get_reading_progress(&args.novel_id).await?;
            match saved.map(|p| p.last_chapter_id) {
                Some(id) => id,
                None => chapters
                    .iter()
                    .min_by_key(|c| c.chapter_number)
                    .map(|c| c.id.clone())
                    .ok_or_else(|| anyhow!("小说 {} 还没有章节", args.novel_id))?,
            }
        }
    };

    let (mut tracker, start) = ReadingSessionTracker::open(
        app.prefs.clone(),
        &args.novel_id,
        &chapter_id,
        app.config.progress_save_interval(),
    )
    .await?;
    show_chapter(app, &args.novel_id, &chapter_id, start.restore_position).await?;

    if let Some(position) = args.position {
        tracker
            .on_scroll(ScrollMetrics {
                scroll_y: f64::from(position),
                ..ScrollMetrics::default()
            })
            .await?;
    }

    let neighbors = ChapterNeighbors::locate(&chapters, &chapter_id);
    let target = if args.next {
        neighbors.next.clone()
    } else if args.prev {
        neighbors.prev.clone()
    } else {
        None
    };

    match target {
        Some(target) => {
            let start = tracker.navigate(&target).await?;
            show_chapter(app, &args.novel_id, &target, start.restore_position).await?;
        }
        None if args.next || args.prev => {
            tracker.flush().await?;
            bail!("没有{}了", if args.next { "下一章" } else { "上一章" });
        }
        None => tracker.flush().await?,
    }

    let neighbors = ChapterNeighbors::locate(&chapters, tracker.chapter_id());
    if let Some(prev) = neighbors.prev {
        println!("上一章: {prev}");
    }
    if let Some(next) = neighbors.next {
        println!("下一章: {next}");
    }
    Ok(())
}

async fn show_chapter(
    app: &App,
    novel_id: &str,
    chapter_id: &str,
    restore_position: Option<u32>,
) -> Result<()> {
    let chapter = app.client.get_chapter(novel_id, chapter_id).await?;
    if let Err(err) = app.client.increment_chapter_views(novel_id, chapter_id).await {
        warn!(target: "reader", "failed to record view: {err}");
    }
    info!(target: "reader", novel_id, chapter_id, "chapter loaded");

    println!("第{}章 {}", chapter.chapter_number, chapter.title);
    if let Some(pos) = restore_position {
        println!("(上次读到 {pos}px)");
    }
    println!();
    println!("{}", chapter.content.as_deref().unwrap_or_default());
    println!();
    Ok(())
}

async fn settings(app: &App, args: SettingsArgs) -> Result<()> {
    let mut settings: ReadingSettings = app.prefs.get_reading_settings().await?;
    let mut changed = false;

    if let Some(size) = args.font_size {
        settings.font_size = size;
        changed = true;
    }
    if args.bigger {
        settings.increase_font();
        changed = true;
    }
    if args.smaller {
        settings.decrease_font();
        changed = true;
    }
    if args.reset_font {
        settings.reset_font();
        changed = true;
    }
    if let Some(theme) = args.theme {
        settings.theme = theme.parse::<Theme>()?;
        changed = true;
    }

    if changed {
        app.prefs.save_reading_settings(settings).await?;
    }
    let role = app.prefs.get_role().await?;
    println!("角色: {role}");
    println!("字号: {}px", settings.font_size);
    println!("主题: {:?}", settings.theme);
    Ok(())
}

async fn novel(app: &App, cmd: NovelCommand) -> Result<()> {
    let result = match cmd {
        NovelCommand::Create { acting, fields } => {
            let publisher = Publisher::new(&app.client, &app.prefs, &acting.user_id);
            publisher
                .create_novel(fields.into_draft())
                .await
                .map(|n| println!("已创建 [{}] {}", n.id, n.title))
        }
        NovelCommand::Edit {
            novel_id,
            acting,
            fields,
        } => {
            let publisher = Publisher::new(&app.client, &app.prefs, &acting.user_id);
            publisher
                .edit_novel(&novel_id, fields.into_draft())
                .await
                .map(|n| println!("已保存 [{}] {}", n.id, n.title))
        }
        NovelCommand::Delete {
            novel_id,
            acting,
            yes,
        } => {
            if !yes {
                bail!("删除不可恢复，确认请加 --yes");
            }
            let publisher = Publisher::new(&app.client, &app.prefs, &acting.user_id);
            publisher
                .delete_novel(&novel_id)
                .await
                .map(|()| println!("已删除 {novel_id}"))
        }
        NovelCommand::Publish {
            novel_id,
            acting,
            number,
            title,
            content_file,
        } => {
            let content = tokio::fs::read_to_string(&content_file)
                .await
                .with_context(|| format!("无法读取 {}", content_file.display()))?;
            let draft = ChapterDraft {
                chapter_number: number,
                title,
                content,
            };
            let publisher = Publisher::new(&app.client, &app.prefs, &acting.user_id);
            publisher
                .publish_chapter(&novel_id, &draft)
                .await
                .map(|c| println!("已发布 第{}章 {} [{}]", c.chapter_number, c.title, c.id))
        }
    };

    match result {
        Err(err) if err.is_abort() => {
            warn!(target: "publish", "{err}");
            bail!("操作已中止：{err}")
        }
        other => other.map_err(Into::into),
    }
}
