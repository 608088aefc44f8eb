pub mod communicator;
pub mod config;
pub mod error;
pub mod handles;
pub mod limiter;
pub mod master;
pub mod matcher;
pub mod plan;
pub mod query_limiter;
pub mod result;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod thread;
pub mod types;

pub use error::{MatchError, Result};

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                              DISTMATCH MATCH-CORE ARCHITECTURE                               │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── C10: FAÇADE ──────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                              struct Matcher                                         │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ rank_setup: Arc<RankSetup>          // compiled ranking program              │ │    │
│  │  │ view_resolver: Arc<dyn ViewResolver>// field -> physical source resolution   │ │    │
│  │  │ defaults: MatcherDefaults           // process-wide knobs                    │ │    │
│  │  │ soft_timeout_factor: AtomicU64      // adaptive soft-timeout tracking        │ │    │
│  │  │ stats: Mutex<MatchingStats>         // running aggregate                     │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│  ┌─────────────────────┐  ┌──────────────────────┐  ┌───────────────────────────────┐     │
│  │ struct MatchRequest │  │ struct MatchReply     │  │ struct DocsumMatcher           │     │
│  │ • query: QueryNode  │  │ • hits: Vec<Hit>      │  │ • rebuilds a plan restricted    │     │
│  │ • doom: Doom        │  │ • coverage: Coverage  │  │   to requested docids, for      │     │
│  │ • rank_profile      │  │ • total_hit_count     │  │   summary/rank-feature fetch    │     │
│  └─────────────────────┘  └──────────────────────┘  └───────────────────────────────┘     │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────── C11: SESSION MANAGER ─────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────┐  ┌──────────────────────────┐  ┌──────────────────────┐       │
│  │ struct SessionManager  │  │ struct SearchSession      │  │ LruCache<...>        │       │
│  │ • search: Mutex<Map>   │  │ • id: Uuid                │  │   grouping sessions  │       │
│  │ • grouping: Mutex<Lru> │  │ • plan: Arc<PlanNode>      │  └──────────────────────┘       │
│  │ • prune_timed_out()    │  │ • created_at: Instant      │                                  │
│  └────────────────────────┘  └──────────────────────────┘                                  │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── C9: MASTER ───────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                              struct MatchMaster                                     │    │
│  │  • chooses DocidRangeScheduler strategy from num_search_partitions / num_threads    │    │
│  │  • builds MatchLoopCommunicator, spawns N MatchThread workers via thread::scope     │    │
│  │  • aggregates MatchingStats, assembles the final Reply                             │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────── C8: MATCH THREAD ────────────┐  ┌──────────── C2: COMMUNICATOR ────────────────┐
│ struct MatchThread                       │  │ struct MatchLoopCommunicator                 │
│ • runs the generic inner loop            │  │ • 3 Rendezvous barriers (freq/2nd-phase/done)│
│   (do_rank/do_limit/do_share/drop flags) │  │ • best_scores, best_dropped, diversifier     │
│ • first + second phase scoring           │  └───────────────────────────────────────────────┘
│ • soft/hard doom checks                  │
└───────────────────────────────────────────┘  ┌──────────── C1: SCHEDULER ────────────────────┐
                                                 │ trait DocidRangeScheduler                     │
┌──────────── C7: RESULT PROCESSOR ─────────┐  │ • PartitionScheduler / TaskScheduler /        │
│ struct HitCollector (heap + array)        │  │   AdaptiveScheduler                           │
│ struct ResultProcessor (dual merge)       │  └────────────────────────────────────────────────┘
└─────────────────────────────────────────────┘
                                                ┌──────────── C3: HANDLE RECORDER ──────────────┐
┌──────────── C6: MATCH-PHASE LIMITER ──────┐  │ struct HandleRecorder / MatchDataTags          │
│ struct MatchPhaseLimiter                  │  └────────────────────────────────────────────────┘
│ struct MatchPhaseLimitCalculator          │
│ struct Coverage                           │  ┌──────────── C5: ATTRIBUTE LIMITER ────────────┐
└─────────────────────────────────────────────┘  │ struct AttributeLimiter (lazy, freeze-once)  │
                                                │ struct RangeSpec                              │
┌──────────────────────── C4: PLAN (plan/) ─────────────────────────────────────────────────┐
│ ast::QueryNode -> field_splitter -> builder::PlanBuilder -> blueprint::PlanNode           │
│   -> optimizer -> whitelist -> freeze -> fetch_postings -> create_search                  │
└──────────────────────────────────────────────────────────────────────────────────────────┘
*/
