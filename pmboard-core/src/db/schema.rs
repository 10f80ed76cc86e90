pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    repo_url TEXT,
    context_md TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS milestones (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    target_date TEXT,
    position INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS features (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    milestone_id TEXT REFERENCES milestones(id) ON DELETE SET NULL,
    title TEXT NOT NULL,
    description TEXT,
    spec TEXT,
    priority TEXT NOT NULL DEFAULT 'MEDIUM' CHECK (priority IN ('LOW', 'MEDIUM', 'HIGH', 'URGENT')),
    status TEXT NOT NULL DEFAULT 'BACKLOG' CHECK (status IN ('BACKLOG', 'TODO', 'IN_PROGRESS', 'IN_REVIEW', 'DONE', 'CANCELLED')),
    position INTEGER NOT NULL DEFAULT 0,
    branch_url TEXT,
    pr_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subtasks (
    id TEXT PRIMARY KEY,
    feature_id TEXT NOT NULL REFERENCES features(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'OPEN' CHECK (status IN ('OPEN', 'DONE')),
    position INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attachments (
    id TEXT PRIMARY KEY,
    feature_id TEXT NOT NULL REFERENCES features(id) ON DELETE CASCADE,
    filename TEXT NOT NULL,
    original_name TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    url TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- feature_id / subtask_id are not foreign keys: entries outlive
-- the entities they describe and carry title snapshots instead.
CREATE TABLE IF NOT EXISTS change_log (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    action TEXT NOT NULL,
    summary TEXT NOT NULL,
    feature_id TEXT,
    feature_title TEXT,
    subtask_id TEXT,
    subtask_title TEXT,
    meta JSON,
    source TEXT NOT NULL DEFAULT 'human' CHECK (source IN ('human', 'agent')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_features_scope ON features(project_id, status, position);
CREATE INDEX IF NOT EXISTS idx_features_milestone ON features(milestone_id);
CREATE INDEX IF NOT EXISTS idx_subtasks_feature ON subtasks(feature_id, position);
CREATE INDEX IF NOT EXISTS idx_attachments_feature ON attachments(feature_id);
CREATE INDEX IF NOT EXISTS idx_milestones_project ON milestones(project_id, position);
CREATE INDEX IF NOT EXISTS idx_change_log_project ON change_log(project_id, created_at);

CREATE TRIGGER IF NOT EXISTS change_log_immutable
    BEFORE UPDATE ON change_log
BEGIN
    SELECT RAISE(ABORT, 'change_log entries are immutable');
END;
"#;
