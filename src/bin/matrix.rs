//! Sums matrix rows on a pipeline of column actors.
//!
//! One actor per column, chained up with spawn messages. A row token
//! enters at column 0 and visits every column in order, each column
//! sleeps for its cell's cost and adds the cell's value, the last
//! column prints the row sum. Input format on stdin (pass `-`): row
//! count, column count, then `value cost_ms` pairs in row major order.

use std::{io::Read, sync::Arc, time::Duration};
use troupe::prelude::*;

const MSG_INIT: usize = 1;
const MSG_REGISTER: usize = 2;
const MSG_ROW: usize = 3;
const MSG_FINISH: usize = 4;

#[derive(Clone, Copy, Debug)]
struct Cell {
    value: i64,
    delay_ms: u64,
}

struct Matrix {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl Matrix {
    fn at(&self, row: usize, col: usize) -> Cell {
        self.cells[row * self.cols + col]
    }
}

struct ColumnInit {
    col: usize,
    matrix: Arc<Matrix>,
}

/// A row's running sum on its way through the pipeline
#[derive(Clone, Copy, Debug)]
struct RowToken {
    row: usize,
    acc: i64,
}

struct ColumnState {
    parent: Option<ActorId>,
    col: usize,
    matrix: Option<Arc<Matrix>>,
    next: Option<ActorId>,
    /// Tokens processed before the next column has registered itself
    pending: Vec<RowToken>,
    rows_done: usize,
}

fn on_hello(ctx: &mut ActorContext, payload: Option<Payload>) {
    let parent = payload
        .and_then(|p| p.downcast::<ActorId>().ok())
        .map(|id| *id);
    ctx.set_state(ColumnState {
        parent,
        col: 0,
        matrix: None,
        next: None,
        pending: Vec::new(),
        rows_done: 0,
    });
    if let Some(parent) = parent {
        ctx.send(parent, Message::user(MSG_REGISTER, ctx.self_id()))
            .expect("register");
    }
}

fn on_init(ctx: &mut ActorContext, payload: Option<Payload>) {
    let init = payload
        .and_then(|p| p.downcast::<ColumnInit>().ok())
        .expect("column init");
    let col = init.col;
    let matrix = init.matrix;
    let last = col + 1 == matrix.cols;
    {
        let st = ctx.state_as::<ColumnState>().expect("state");
        st.col = col;
        st.matrix = Some(matrix);
    }
    if !last {
        ctx.send(ctx.self_id(), Message::spawn(column_role()))
            .expect("spawn next column");
    }
}

fn on_register(ctx: &mut ActorContext, payload: Option<Payload>) {
    let child = payload
        .and_then(|p| p.downcast::<ActorId>().ok())
        .map(|id| *id)
        .expect("child id");
    let (col, matrix, pending) = {
        let st = ctx.state_as::<ColumnState>().expect("state");
        st.next = Some(child);
        (
            st.col,
            st.matrix.clone().expect("matrix"),
            std::mem::take(&mut st.pending),
        )
    };
    ctx.send(
        child,
        Message::user(
            MSG_INIT,
            ColumnInit {
                col: col + 1,
                matrix,
            },
        ),
    )
    .expect("init next column");
    for token in pending {
        ctx.send(child, Message::user(MSG_ROW, token))
            .expect("flush");
    }
}

fn on_row(ctx: &mut ActorContext, payload: Option<Payload>) {
    let token = payload
        .and_then(|p| p.downcast::<RowToken>().ok())
        .map(|t| *t)
        .expect("row token");
    let (matrix, col, next) = {
        let st = ctx.state_as::<ColumnState>().expect("state");
        (st.matrix.clone().expect("matrix"), st.col, st.next)
    };
    let cell = matrix.at(token.row, col);
    std::thread::sleep(Duration::from_millis(cell.delay_ms));
    let acc = token.acc + cell.value;
    if col + 1 == matrix.cols {
        println!("Row {} sum: {}", token.row, acc);
        let st = ctx.state_as::<ColumnState>().expect("state");
        st.rows_done += 1;
        if st.rows_done == matrix.rows {
            ctx.send(ctx.self_id(), Message::user_empty(MSG_FINISH))
                .expect("finish");
        }
    } else {
        let forwarded = RowToken {
            row: token.row,
            acc,
        };
        match next {
            Some(next) => ctx
                .send(next, Message::user(MSG_ROW, forwarded))
                .expect("forward"),
            None => {
                let st = ctx.state_as::<ColumnState>().expect("state");
                st.pending.push(forwarded);
            }
        }
    }
}

fn on_finish(ctx: &mut ActorContext, _payload: Option<Payload>) {
    let parent = ctx.state_as::<ColumnState>().expect("state").parent;
    if let Some(parent) = parent {
        ctx.send(parent, Message::user_empty(MSG_FINISH))
            .expect("finish");
    }
    ctx.send(ctx.self_id(), Message::go_die()).expect("go die");
}

fn column_role() -> Arc<Role> {
    Role::builder()
        .hello(on_hello)
        .handler(MSG_INIT, on_init)
        .handler(MSG_REGISTER, on_register)
        .handler(MSG_ROW, on_row)
        .handler(MSG_FINISH, on_finish)
        .build()
}

fn parse_matrix(input: &str) -> Option<Matrix> {
    let mut it = input.split_whitespace();
    let rows: usize = it.next()?.parse().ok()?;
    let cols: usize = it.next()?.parse().ok()?;
    let mut cells = Vec::with_capacity(rows * cols);
    for _ in 0..rows * cols {
        let value: i64 = it.next()?.parse().ok()?;
        let delay_ms: u64 = it.next()?.parse().ok()?;
        cells.push(Cell { value, delay_ms });
    }
    Some(Matrix { rows, cols, cells })
}

fn sample_matrix() -> Matrix {
    let (rows, cols) = (4, 3);
    let mut cells = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            cells.push(Cell {
                value: (row * cols + col + 1) as i64,
                delay_ms: ((row + col) % 3) as u64 * 15,
            });
        }
    }
    Matrix { rows, cols, cells }
}

fn main() {
    let matrix = if std::env::args().nth(1).as_deref() == Some("-") {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .expect("read stdin");
        match parse_matrix(&input) {
            Some(matrix) => matrix,
            None => {
                eprintln!("Malformed matrix input");
                std::process::exit(1);
            }
        }
    } else {
        println!("Using the built-in sample matrix, pass - to read one from stdin");
        sample_matrix()
    };
    if matrix.rows == 0 || matrix.cols == 0 {
        println!("Nothing to sum");
        return;
    }
    let rows = matrix.rows;
    let mut conf = TroupeConfig::new();
    conf.label("matrix");
    let (system, first) = conf.build(column_role()).expect("TroupeSystem");
    system
        .send(
            first,
            Message::user(
                MSG_INIT,
                ColumnInit {
                    col: 0,
                    matrix: Arc::new(matrix),
                },
            ),
        )
        .expect("send");
    for row in 0..rows {
        system
            .send(first, Message::user(MSG_ROW, RowToken { row, acc: 0 }))
            .expect("send row");
    }
    system.join(first);
}
