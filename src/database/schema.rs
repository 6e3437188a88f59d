pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;

CREATE TABLE IF NOT EXISTS workers (
    id INTEGER PRIMARY KEY,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'worker' CHECK (role IN ('worker', 'admin')),
    active BOOLEAN NOT NULL DEFAULT TRUE,
    desired_weekly_hours INTEGER CHECK (
        desired_weekly_hours IS NULL OR desired_weekly_hours BETWEEN 1 AND 40
    ),
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS shifts (
    id INTEGER PRIMARY KEY,
    day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    shift_type TEXT NOT NULL CHECK (shift_type IN ('weekday', 'weekend', 'rotating')),
    required_workers INTEGER NOT NULL DEFAULT 2 CHECK (required_workers >= 1),
    active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    CHECK (end_time > start_time)
);

CREATE TABLE IF NOT EXISTS availability (
    id INTEGER PRIMARY KEY,
    worker_id INTEGER NOT NULL,
    shift_id INTEGER NOT NULL,
    semester TEXT NOT NULL,
    is_available BOOLEAN NOT NULL DEFAULT TRUE,
    preference_rank INTEGER CHECK (
        preference_rank IS NULL OR preference_rank BETWEEN 1 AND 5
    ),
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (worker_id, shift_id, semester),
    FOREIGN KEY (worker_id) REFERENCES workers (id) ON DELETE CASCADE,
    FOREIGN KEY (shift_id) REFERENCES shifts (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_availability_semester ON availability (semester);

CREATE TABLE IF NOT EXISTS schedules (
    id INTEGER PRIMARY KEY,
    semester TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'published')),
    created_at TIMESTAMP NOT NULL,
    published_at TIMESTAMP,
    generated_by INTEGER,
    algorithm_version TEXT NOT NULL,
    notes TEXT,
    CHECK ((status = 'draft') = (published_at IS NULL)),
    FOREIGN KEY (generated_by) REFERENCES workers (id)
);

CREATE INDEX IF NOT EXISTS idx_schedules_semester ON schedules (semester, status);

CREATE TABLE IF NOT EXISTS schedule_assignments (
    id INTEGER PRIMARY KEY,
    schedule_id INTEGER NOT NULL,
    shift_id INTEGER NOT NULL,
    worker_id INTEGER NOT NULL,
    assignment_score INTEGER CHECK (
        assignment_score IS NULL OR assignment_score BETWEEN 1 AND 5
    ),
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (schedule_id, shift_id, worker_id),
    FOREIGN KEY (schedule_id) REFERENCES schedules (id) ON DELETE CASCADE,
    FOREIGN KEY (shift_id) REFERENCES shifts (id),
    FOREIGN KEY (worker_id) REFERENCES workers (id)
);

CREATE INDEX IF NOT EXISTS idx_assignments_worker ON schedule_assignments (worker_id);

CREATE TABLE IF NOT EXISTS schedule_conflicts (
    id INTEGER PRIMARY KEY,
    schedule_id INTEGER NOT NULL,
    conflict_type TEXT NOT NULL,
    severity TEXT NOT NULL CHECK (severity IN ('error', 'warning', 'info')),
    shift_id INTEGER,
    assigned INTEGER NOT NULL DEFAULT 0,
    required INTEGER NOT NULL DEFAULT 0,
    description TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (schedule_id) REFERENCES schedules (id) ON DELETE CASCADE,
    FOREIGN KEY (shift_id) REFERENCES shifts (id)
);

CREATE TRIGGER IF NOT EXISTS schedule_assignments_no_overlap
BEFORE INSERT ON schedule_assignments
WHEN EXISTS (
    SELECT 1
    FROM schedule_assignments held_assignment
    JOIN shifts held ON held.id = held_assignment.shift_id
    JOIN shifts incoming ON incoming.id = NEW.shift_id
    WHERE held_assignment.schedule_id = NEW.schedule_id
      AND held_assignment.worker_id = NEW.worker_id
      AND held.day_of_week = incoming.day_of_week
      AND held.start_time < incoming.end_time
      AND incoming.start_time < held.end_time
)
BEGIN
    SELECT RAISE(ABORT, 'constraint violation: overlapping assignment');
END;

CREATE TRIGGER IF NOT EXISTS schedule_assignments_within_staffing
BEFORE INSERT ON schedule_assignments
WHEN (
    SELECT COUNT(*) FROM schedule_assignments
    WHERE schedule_id = NEW.schedule_id AND shift_id = NEW.shift_id
) >= (
    SELECT required_workers FROM shifts WHERE id = NEW.shift_id
)
BEGIN
    SELECT RAISE(ABORT, 'constraint violation: shift over-staffed');
END;

CREATE TRIGGER IF NOT EXISTS schedule_assignments_immutable
BEFORE UPDATE ON schedule_assignments
BEGIN
    SELECT RAISE(ABORT, 'constraint violation: assignments are immutable');
END;
"#;

/// Marker carried by every trigger-raised error above.
pub const CONSTRAINT_MARKER: &str = "constraint violation";
