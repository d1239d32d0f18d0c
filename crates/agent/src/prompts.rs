use railsql_core::domain::conversation::ConversationState;
use railsql_core::warehouse::SchemaCatalog;

use crate::llm::{Prompt, PromptTask};

const ROUTING_REPLY_SHAPE: &str =
    "{'next_step': 'query'} or {'next_step': 'interpret'} or {'next_step': 'stop'}";

pub fn supervisor_prompt(state: &ConversationState) -> Prompt {
    let answer = state.answer.as_deref().unwrap_or_default();
    let text = format!(
        "You are a supervisor. Decide whether to create a query and fetch new data from the \
database or to interpret the data already available.\n\n\
There should always be an answer to the question. If the data is available and the question \
is answered, end the conversation.\n\
If the data is not available, create a query and fetch the data from the database.\n\
If the data is available but the question is not answered, interpret the data and answer the \
question.\n\
If the question cannot be answered, end the conversation.\n\n\
Question: {question}\n\
Data: {data}\n\
Answer: {answer}\n\n\
Reply with JSON like {shape}.\n",
        question = state.question,
        data = state.data_for_prompt(),
        answer = answer,
        shape = ROUTING_REPLY_SHAPE,
    );

    let task = PromptTask::Route { has_data: state.has_data(), has_answer: state.has_answer() };
    Prompt::new(task, text)
}

pub fn query_prompt(state: &ConversationState, catalog: &SchemaCatalog) -> Prompt {
    let text = format!(
        "You are a query agent for a TimescaleDB database. You write a query for the user \
question and, if necessary, correct errors in the previous query.\n\
The database has the following tables in schema {schema}:\n\
{tables}\n\
If useful, use TimescaleDB hypertable functions such as time_bucket, time_bucket_gapfill or \
stats_agg.\n\
The user question is: {question}\n\
The last query was: {query}\n\
The last error of that query was: {error}\n\
Reply with ONLY a valid SQL query that can be executed on the database directly. Do not add \
explanations or comments.\n\
Additionally:\n\
- arrivalstatus and departurestatus only contain 'Ausfall', 'Neu' or NULL. Only filter on them \
if necessary.\n\
- arrivalminutes and departureminutes are the delay in minutes.\n",
        schema = catalog.schema,
        tables = catalog.describe(),
        question = state.question,
        query = state.query.as_deref().unwrap_or_default(),
        error = state.error.as_deref().unwrap_or_default(),
    );

    Prompt::new(PromptTask::GenerateQuery, text)
}

pub fn interpretation_prompt(state: &ConversationState) -> Prompt {
    let text = format!(
        "You are an interpretation agent for a TimescaleDB database. Interpret the data from the \
last query and answer the user question.\n\
Most delays in the data set are in minutes. Unless stated otherwise, assume figures are \
minutes.\n\
The data from the query is: {data}\n\
The user question is: {question}\n\
Answer in the same language as the user question.\n",
        data = state.data_for_prompt(),
        question = state.question,
    );

    Prompt::new(PromptTask::Interpret, text)
}
